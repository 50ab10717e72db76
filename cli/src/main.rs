use clap::{Parser, Subcommand};
use log::debug;

mod dma;
mod load;
mod proxies;
mod set;
mod status;
mod watch;

#[derive(Parser, Debug)]
#[command(name = "skfpga")]
#[command(bin_name = "skfpga")]
#[command(about = "Command-line client for the skfpgad FPGA daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show board description, pin levels and bus timings
    Status,
    /// Read one value from the device
    #[command(subcommand)]
    Get(GetSubcommand),
    /// Change one value on the device
    #[command(subcommand)]
    Set(SetSubcommand),
    /// Program the FPGA from a bitstream file
    Load {
        /// path to the bitstream file, resolved to an absolute path
        /// before it is handed to the daemon
        file: String,
    },
    /// Move data between the daemon scratch buffer and the selected window
    Dma {
        /// transfer direction, to-fpga or from-fpga
        direction: String,
        /// window-relative byte address, decimal or 0x-hex
        #[arg(value_parser = parse_u32)]
        addr: u32,
        /// number of bytes to move, decimal or 0x-hex
        #[arg(value_parser = parse_u32)]
        len: u32,
        /// return immediately and let the transfer finish in the daemon
        #[arg(long)]
        background: bool,
    },
    /// Arm the interrupt watcher and print events as they arrive
    Watch,
}

#[derive(Subcommand, Debug)]
enum GetSubcommand {
    /// 16-bit word at a device address
    Word {
        /// byte address, decimal or 0x-hex
        #[arg(value_parser = parse_u32)]
        addr: u32,
    },
    /// Setup, pulse, cycle and mode values of one timing slot
    Timings { slot: u8 },
    /// Current address selector
    Selector,
    /// Level of the reset pin
    Reset,
    /// Level of the host-to-FPGA interrupt pin
    HostIrq,
    /// Level of the interrupt pin driven by the FPGA design
    FpgaIrq,
}

#[derive(Subcommand, Debug)]
enum SetSubcommand {
    /// Write a 16-bit word to a device address
    Word {
        /// byte address, decimal or 0x-hex
        #[arg(value_parser = parse_u32)]
        addr: u32,
        /// value to write, decimal or 0x-hex
        #[arg(value_parser = parse_u16)]
        value: u16,
    },
    /// Program one timing slot of the static memory controller
    Timings {
        slot: u8,
        #[arg(value_parser = parse_u32)]
        setup: u32,
        #[arg(value_parser = parse_u32)]
        pulse: u32,
        #[arg(value_parser = parse_u32)]
        cycle: u32,
        #[arg(value_parser = parse_u32)]
        mode: u32,
    },
    /// Pick the window data operations target: cs0, cs1 or dma
    Selector { name: String },
    /// Drive the reset pin
    Reset {
        /// high/low, on/off, true/false or 1/0
        #[arg(value_parser = parse_level, action = clap::ArgAction::Set)]
        level: bool,
    },
    /// Drive the host-to-FPGA interrupt pin
    HostIrq {
        /// high/low, on/off, true/false or 1/0
        #[arg(value_parser = parse_level, action = clap::ArgAction::Set)]
        level: bool,
    },
    /// Arm or disarm the watcher for the interrupt line from the FPGA
    FpgaIrq {
        /// on/off, true/false or 1/0
        #[arg(value_parser = parse_level, action = clap::ArgAction::Set)]
        enable: bool,
    },
}

/// Accepts decimal or 0x-prefixed hexadecimal.
fn parse_u32(value: &str) -> Result<u32, String> {
    let digits = value.trim();
    match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse(),
    }
    .map_err(|e| format!("'{value}' is not a number: {e}"))
}

/// Accepts decimal or 0x-prefixed hexadecimal.
fn parse_u16(value: &str) -> Result<u16, String> {
    let digits = value.trim();
    match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => digits.parse(),
    }
    .map_err(|e| format!("'{value}' is not a number: {e}"))
}

/// Accepts the usual spellings of a pin level.
fn parse_level(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "high" | "on" | "true" | "1" => Ok(true),
        "low" | "off" | "false" | "0" => Ok(false),
        other => Err(format!("'{other}' is not a pin level")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let message = match cli.command {
        Commands::Status => status::status_handler().await?,
        Commands::Get(sub_command) => status::get_handler(&sub_command).await?,
        Commands::Set(sub_command) => set::set_handler(&sub_command).await?,
        Commands::Load { file } => load::load_handler(&file).await?,
        Commands::Dma {
            direction,
            addr,
            len,
            background,
        } => dma::dma_handler(&direction, addr, len, background).await?,
        Commands::Watch => watch::watch_handler().await?,
    };
    println!("{message}");
    Ok(())
}

#[cfg(test)]
mod test_argument_parsing {
    use super::*;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case::decimal("4096", 4096)]
    #[case::hex("0x1000", 0x1000)]
    #[case::hex_uppercase_prefix("0X20", 0x20)]
    #[case::zero("0", 0)]
    fn test_numbers_parse_in_both_bases(#[case] text: &str, #[case] expected: u32) {
        assert_eq!(parse_u32(text), Ok(expected));
    }

    #[gtest]
    fn test_bad_numbers_are_rejected() {
        expect_that!(parse_u32("fpga"), err(contains_substring("not a number")));
        expect_that!(parse_u32("0x"), err(anything()));
        expect_that!(parse_u16("0x10000"), err(anything()));
    }

    #[rstest]
    #[case::high("high", true)]
    #[case::low("low", false)]
    #[case::on("ON", true)]
    #[case::numeric("0", false)]
    fn test_levels_parse(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(parse_level(text), Ok(expected));
    }

    #[test]
    fn test_command_line_shapes() {
        let cli = Cli::try_parse_from(["skfpga", "set", "word", "0x1C", "0xBEEF"]).unwrap();
        match cli.command {
            Commands::Set(SetSubcommand::Word { addr, value }) => {
                assert_eq!(addr, 0x1C);
                assert_eq!(value, 0xBEEF);
            }
            other => panic!("parsed into {other:?}"),
        }
        let cli = Cli::try_parse_from(["skfpga", "dma", "to-fpga", "0", "64", "--background"])
            .unwrap();
        match cli.command {
            Commands::Dma { background, .. } => assert!(background),
            other => panic!("parsed into {other:?}"),
        }
        assert!(Cli::try_parse_from(["skfpga", "set", "reset", "sideways"]).is_err());
    }
}
