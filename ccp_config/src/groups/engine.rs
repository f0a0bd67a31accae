crate::config_group!({

    /// Partition size override in bytes for the parallel ranged-download engine.
    /// Zero selects a size automatically from the window-size ladder.
    ///
    /// Use the environment variable `CCP_ENGINE_PARTSIZE` to set this value.
    ref partsize: u64 = 0;

    /// The largest partition size for which the leading block is buffered in
    /// memory instead of a temp file. Raising this can reduce first-byte latency
    /// on slow disk-backed storage at the expense of memory utilization.
    ///
    /// The default value is 32MiB.
    ///
    /// Use the environment variable `CCP_ENGINE_MAXMEM` to set this value.
    ref maxmem: u64 = 32 * 1024 * 1024;

    /// Comma-separated list of candidate temporary directories for disk-backed
    /// blocks, used round-robin. Empty selects the OS temp directory.
    ///
    /// Use the environment variable `CCP_ENGINE_TMP` to set this value.
    ref tmp: String = String::new();

    /// Number of times a positional read from a disk-backed block is retried
    /// before the error is surfaced.
    ///
    /// Use the environment variable `CCP_ENGINE_RETRY` to set this value.
    ref retry: u32 = 10;

    /// Keep temporary files on block close and skip registry cleanup
    /// (debugging only).
    ///
    /// Use the environment variable `CCP_ENGINE_NOGC` to set this value.
    ref nogc: bool = false;

    /// Skip the scheduler-quantum sleep while waiting for a slow producer.
    /// May cause 100% CPU usage on a very slow connection (diagnostic).
    ///
    /// Use the environment variable `CCP_ENGINE_SPIN` to set this value.
    ref spin: bool = false;

    /// Disable ordered admission of block workers at the connection gate
    /// (tests only).
    ///
    /// Use the environment variable `CCP_ENGINE_NOSORT` to set this value.
    ref nosort: bool = false;
});
