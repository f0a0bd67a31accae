/// Macro to create a configuration value group struct.
///
/// Usage:
/// ```rust
/// mod example {
///     use ccp_config::config_group;
///
///     config_group!({
///         ref test_int: usize = 42;
///         ref test_string: String = "default".to_string();
///     });
/// }
/// ```
///
/// This creates a `ConfigValueGroup` struct with the specified fields, a `Default`
/// implementation holding the declared values, and an `apply_env_overrides` method
/// that loads overrides from environment variables named after the group.
#[macro_export]
macro_rules! config_group {
    ({
        $(
            $(#[$meta:meta])*
            ref $name:ident : $type:ty = $value:expr;
        )+
    }) => {
        #[allow(unused_imports)]
        use $crate::ParsableConfigValue;

        /// ConfigValueGroup struct containing all configurable values
        #[derive(Debug, Clone)]
        pub struct ConfigValueGroup {
            $(
                $(#[$meta])*
                pub $name: $type,
            )+
        }

        impl Default for ConfigValueGroup {
            /// Create a new instance with default values only (no environment variable overrides).
            fn default() -> Self {
                Self {
                    $(
                        $name: {
                            let v: $type = $value;
                            v
                        },
                    )+
                }
            }
        }

        impl AsRef<ConfigValueGroup> for ConfigValueGroup {
            fn as_ref(&self) -> &ConfigValueGroup {
                self
            }
        }

        impl ConfigValueGroup {
            /// Create a new instance with default values only (no environment variable overrides).
            /// This is an alias for `Default::default()`.
            pub fn new() -> Self {
                Self::default()
            }

            /// Apply environment variable overrides to this configuration group.
            ///
            /// The group name is derived from the module path. For example, in module
            /// `ccp_config::groups::engine`, the env var for `partsize` is
            /// CCP_ENGINE_PARTSIZE.
            pub fn apply_env_overrides(&mut self) {
                $(
                    {
                        // Derive the env var name from the module name at compile time.
                        const ENV_VAR_NAME: &str = const_str::concat!(
                            "CCP_",
                            const_str::convert_ascii_case!(upper, konst::string::rsplit_once(module_path!(), "::").unwrap().1),
                            "_",
                            const_str::convert_ascii_case!(upper, stringify!($name)));

                        let maybe_env_value = std::env::var(ENV_VAR_NAME).ok();

                        let default_value: $type = $value;
                        self.$name = <$type>::parse(stringify!($name), maybe_env_value, default_value);
                    }
                )+
            }
        }

        /// Type alias for easier reference in config aggregation
        pub(crate) type ConfigValues = ConfigValueGroup;
    };
}
