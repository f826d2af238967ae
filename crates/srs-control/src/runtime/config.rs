use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub print_default_config: bool,
    pub config_path: Option<PathBuf>,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    /// Keep every simulated stick at neutral instead of cycling through a
    /// demonstration profile.
    pub no_sim_profile: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if i + 1 < args.len() {
                        cfg.config_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--no-sim-profile" => {
                    cfg.no_sim_profile = true;
                }
                "--print-default-config" => {
                    cfg.print_default_config = true;
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"srs-control - RC pulse-width decoder and linear actuator controller

USAGE:
    srs-control [OPTIONS]

OPTIONS:
    --config <PATH>          JSON channel configuration [default: built-in linear actuator]
    --print-default-config   Print the built-in configuration as JSON and exit
    --run-seconds <SECS>     Run for a fixed duration then exit
    --json-logs              Output logs in JSON format (for log aggregation)
    --log-dir <DIR>          Also write logs to a daily-rotated file in DIR
    --no-sim-profile         Hold simulated sticks at neutral
    -h, --help               Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                 Set log filter (e.g., RUST_LOG=debug,srs_core=trace)

EXAMPLES:
    # Short simulated run
    srs-control --run-seconds 10

    # Custom thresholds, logs to file
    srs-control --config channels.json --log-dir /var/log/srs
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("srs-control")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_all_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--config",
            "channels.json",
            "--run-seconds",
            "3",
            "--json-logs",
            "--log-dir",
            "/tmp/srs",
            "--no-sim-profile",
        ]));
        assert_eq!(cfg.config_path, Some(PathBuf::from("channels.json")));
        assert_eq!(cfg.run_seconds, Some(3));
        assert!(cfg.json_logs);
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/srs")));
        assert!(cfg.no_sim_profile);
        assert!(!cfg.show_help);
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--json-logs"]));
        assert!(cfg.show_help);
        assert!(!cfg.json_logs);
    }

    #[test]
    fn bad_duration_and_unknown_flags_are_ignored() {
        let cfg = RuntimeConfig::from_args(&args(&["--run-seconds", "soon", "--bogus"]));
        assert_eq!(cfg.run_seconds, None);
    }
}
