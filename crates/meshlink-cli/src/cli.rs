//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Disable BLE transport
    #[arg(long, global = true)]
    pub no_ble: bool,

    /// Disable TCP transport
    #[arg(long, global = true)]
    pub no_tcp: bool,

    /// Disable serial transport
    #[arg(long, global = true)]
    pub no_serial: bool,

    /// Extra TCP host to probe (repeatable), e.g. 192.168.1.20 or radio.local:4403
    #[arg(long = "host", global = true)]
    pub hosts: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan for devices and list them
    Scan {
        /// How long to scan, in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to a device and log inbound traffic
    Connect {
        /// Device id as shown by `scan`
        device: String,
        /// Stay connected this many seconds; runs until Ctrl+C when omitted
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Auto-connect to the preferred device and stay connected
    Monitor,
    /// Send a text message through a device and exit
    Send {
        /// Device id as shown by `scan`
        device: String,
        /// Message content
        text: String,
        /// Destination node (`!aabbccdd`, `0xaabbccdd` or decimal); broadcast when omitted
        #[arg(short, long)]
        to: Option<String>,
        /// Channel index
        #[arg(long, default_value_t = 0)]
        channel: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "meshlink", "send", "radio-1", "hello mesh", "--to", "!0000abcd", "--channel", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                device,
                text,
                to,
                channel,
            } => {
                assert_eq!(device, "radio-1");
                assert_eq!(text, "hello mesh");
                assert_eq!(to.as_deref(), Some("!0000abcd"));
                assert_eq!(channel, 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "meshlink", "scan", "--json", "--no-ble", "--host", "10.0.0.5", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.no_ble);
        assert_eq!(cli.hosts, vec!["10.0.0.5".to_string()]);
        assert!(matches!(
            cli.command,
            Commands::Scan {
                duration: 10,
                json: true
            }
        ));
    }
}
