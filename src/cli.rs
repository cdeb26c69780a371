use clap::Parser;
use std::time::Duration;

/// Continuous traceroute: discovers the path to a host and keeps
/// measuring per-hop latency and loss
#[derive(Parser, Debug, Clone)]
#[command(name = "pathmon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to trace (IP address or hostname)
    pub target: String,

    /// Use IPv6
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Maximum TTL to probe during discovery
    #[arg(short = 'm', long = "max-hops", default_value = "64")]
    pub max_hops: u8,

    /// Probe timeout in seconds
    #[arg(long = "timeout", default_value = "5.0")]
    pub timeout: f64,

    /// Skip reverse DNS lookups
    #[arg(long = "no-dns")]
    pub no_dns: bool,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Args {
    /// Get probe timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }

        if self.timeout <= 0.0 {
            return Err("Timeout must be positive".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["pathmon", "example.com"]);
        assert_eq!(args.target, "example.com");
        assert!(!args.ipv6);
        assert_eq!(args.max_hops, 64);
        assert_eq!(args.timeout_duration(), Duration::from_secs(5));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_max_hops() {
        let args = Args::parse_from(["pathmon", "example.com", "-m", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_timeout() {
        let args = Args::parse_from(["pathmon", "example.com", "--timeout", "0"]);
        assert!(args.validate().is_err());
    }
}
