use clap::Parser;
use dc2_common::args::{ServerArgs, SpotTimingArgs, TestProfileArgs};

/// `spec.md` §6: flags `-version`, `-log-level`, `-addr`; env `ADDR`,
/// `LOG_LEVEL`, `DC2_SPOT_RECLAIM_AFTER`, `DC2_SPOT_RECLAIM_NOTICE`,
/// `DC2_TEST_PROFILE_PATH`. `clap`'s generated `--version` (enabled by
/// `#[command(version)]`) covers `-version`; everything else flattens in
/// from the shared arg groups so `dc2-server`'s test harness and this
/// binary agree on flag names.
#[derive(Parser, Debug, Clone)]
#[command(name = "dc2", author, version, about = "EC2/AutoScaling-compatible control plane over Docker", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub spot: SpotTimingArgs,

    #[command(flatten)]
    pub profile: TestProfileArgs,
}
