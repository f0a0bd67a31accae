use tracing::warn;

/// Parses a configuration value out of an environment variable, falling back
/// to the built-in default when the variable is unset or malformed.
pub trait ParsableConfigValue: Sized {
    fn parse(name: &str, value: Option<String>, default: Self) -> Self;
}

macro_rules! impl_parse_from_str {
    ($($t:ty),+) => {
        $(
            impl ParsableConfigValue for $t {
                fn parse(name: &str, value: Option<String>, default: Self) -> Self {
                    let Some(raw) = value else {
                        return default;
                    };
                    match raw.trim().parse::<$t>() {
                        Ok(v) => v,
                        Err(_) => {
                            warn!(name, raw, "Ignoring unparsable configuration override");
                            default
                        },
                    }
                }
            }
        )+
    };
}

impl_parse_from_str!(u32, u64, usize, i64, f64);

impl ParsableConfigValue for bool {
    fn parse(name: &str, value: Option<String>, default: Self) -> Self {
        let Some(raw) = value else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!(name, raw, "Ignoring unparsable boolean configuration override");
                default
            },
        }
    }
}

impl ParsableConfigValue for String {
    fn parse(_name: &str, value: Option<String>, default: Self) -> Self {
        value.unwrap_or(default)
    }
}
