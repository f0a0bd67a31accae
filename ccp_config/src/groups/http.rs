crate::config_group!({

    /// Process-wide ceiling on concurrent HTTP range fetches.
    ///
    /// The default value is 24.
    ///
    /// Use the environment variable `CCP_HTTP_MAXHTTP` to set this value.
    ref maxhttp: usize = 24;

    /// Rewrite `https://` source URLs to `http://` for a latency reduction.
    ///
    /// Use the environment variable `CCP_HTTP_INSECURE` to set this value.
    ref insecure: bool = false;

    /// User-Agent header attached to every request. Empty sends none.
    ///
    /// Use the environment variable `CCP_HTTP_USER_AGENT` to set this value.
    ref user_agent: String = String::new();

    /// One extra header attached to every request, colon-separated like curl
    /// (`key:value`). Empty sends none.
    ///
    /// Use the environment variable `CCP_HTTP_EXTRA_HEADER` to set this value.
    ref extra_header: String = String::new();
});
