use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Address the emulator's HTTP API binds to
    #[arg(long, env = "ADDR", default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Address the IMDS proxy listens on. The real link-local
    /// `169.254.169.254:80` binding is only reachable from inside a managed
    /// container via the per-container network plumbing a real deployment
    /// arranges (`spec.md` §1); this process just needs its own reachable
    /// listener for that proxy.
    #[arg(long, env = "DC2_IMDS_ADDR", default_value = "0.0.0.0:8081")]
    pub imds_addr: String,

    /// tracing log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Simulated region used to derive availability zones and DNS names
    #[arg(long, env = "DC2_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Simulated owner/account id attached to reservations
    #[arg(long, env = "DC2_OWNER_ID", default_value = "123456789012")]
    pub owner_id: String,

    /// Container backend: "docker" shells out to the Docker CLI, "memory"
    /// uses the in-memory fake (useful for running dc2 itself without a
    /// container runtime available)
    #[arg(long, env = "DC2_EXECUTOR", default_value = "docker")]
    pub executor: String,

    /// Directory the Docker executor stores EBS-emulating loop-device
    /// backing files in (`spec.md` §4.5). Unused by the in-memory executor.
    #[arg(long, env = "DC2_LOOP_DEVICE_DIR", default_value = "/var/lib/dc2/volumes")]
    pub loop_device_dir: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SpotTimingArgs {
    /// Seconds between a spot request being marked for reclaim and the
    /// backing instance actually being stopped
    #[arg(long, env = "DC2_SPOT_RECLAIM_AFTER", default_value_t = 120)]
    pub spot_reclaim_after_secs: u64,

    /// Seconds of interruption notice surfaced through IMDS before reclaim
    #[arg(long, env = "DC2_SPOT_RECLAIM_NOTICE", default_value_t = 120)]
    pub spot_reclaim_notice_secs: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct TestProfileArgs {
    /// Path to a YAML file describing injected delays and reclaim overrides
    #[arg(long, env = "DC2_TEST_PROFILE_PATH")]
    pub test_profile_path: Option<String>,
}
