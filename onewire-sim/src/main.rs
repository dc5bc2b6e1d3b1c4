use clap::{Parser, Subcommand};
use embedded_hal::delay::DelayNs;
use linux_embedded_hal::Delay;
use onewire_sim::{SimBus, SimDevice, SimPio};
use pio_onewire::{
    OneWire, OneWireEngine, OneWireError, OneWireSearchKind, PioError, PioOneWire,
    PioOneWireBuilder, RomCode,
};
use std::process::ExitCode;

/// Drive a simulated 1-Wire bus with the PIO bus master
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// ROM code of a simulated device, 16 hex digits, family code first
    #[arg(short, long = "device", value_parser = parse_rom)]
    devices: Vec<RomCode>,
    /// ROM code of a simulated device with its alarm flag set
    #[arg(short, long = "alarmed", value_parser = parse_rom)]
    alarmed: Vec<RomCode>,
    /// Number of simulated DS18B20 with random serial numbers to add
    #[arg(short, long, default_value_t = 0)]
    random: usize,
    /// Data GPIO of the 1-Wire line
    #[arg(short, long, default_value_t = 0)]
    pin: u8,
    /// Direction GPIO of an external bus buffer
    #[arg(long)]
    dir: Option<u8>,
    /// Batch width of bulk transfers in bits (0, 8, 16, 24 or 32)
    #[arg(short, long, default_value_t = 8)]
    threshold: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate the devices on the bus
    Scan {
        /// Only devices with their alarm flag set
        #[arg(long)]
        alarm: bool,
        /// Only devices of this family code (hex)
        #[arg(long, value_parser = parse_family)]
        family: Option<u8>,
    },
    /// Read the ROM code of the only device on the bus
    ReadRom,
    /// Address one device
    Select {
        /// ROM code, 16 hex digits, family code first
        #[arg(value_parser = parse_rom)]
        rom: RomCode,
    },
}

fn parse_rom(s: &str) -> Result<RomCode, String> {
    let s = s.trim_start_matches("0x");
    if s.len() != 16 || !s.is_ascii() {
        return Err(format!("expected 16 hex digits, got {s:?}"));
    }
    let mut rom = [0; 8];
    for (i, byte) in rom.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|e| e.to_string())?;
    }
    Ok(rom)
}

fn parse_family(s: &str) -> Result<u8, String> {
    u8::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn hex(rom: &RomCode) -> String {
    rom.iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();
    // Populate the simulated bus
    let mut bus = SimBus::new(args.devices.iter().copied().map(SimDevice::new));
    for rom in &args.alarmed {
        bus.attach(SimDevice::new(*rom).with_alarm(true));
    }
    for _ in 0..args.random {
        bus.attach(SimDevice::random(0x28));
    }
    let mut pio = SimPio::new(bus);
    let mut onewire = match start(&args, &mut pio, Delay) {
        Ok(onewire) => onewire,
        Err(e) => {
            log::error!("Failed to start the 1-Wire engine: {e}");
            return ExitCode::FAILURE;
        }
    };

    let report_selection = matches!(args.command, Command::Select { .. });
    let res = match args.command {
        Command::Scan { alarm, family } => {
            let kind = if alarm {
                OneWireSearchKind::Alarmed
            } else {
                OneWireSearchKind::Normal
            };
            match family {
                Some(family) => onewire.target_setup(family),
                None => onewire.search_reset(),
            }
            let mut found = 0;
            let res = loop {
                match onewire.search(kind) {
                    Ok(Some(rom)) if family.is_some_and(|f| rom[0] != f) => break Ok(()),
                    Ok(Some(rom)) => {
                        found += 1;
                        println!("{}", hex(&rom));
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            };
            if res.is_ok() {
                if found == 0 {
                    println!("no devices found");
                } else {
                    log::info!("Found {found} devices");
                }
            }
            res
        }
        Command::ReadRom => onewire.read_rom().map(|rom| match rom {
            Some(rom) => println!("{}", hex(&rom)),
            None => println!("no devices found"),
        }),
        Command::Select { rom } => onewire.select(&rom).map(|present| {
            if !present {
                println!("no devices found");
            }
        }),
    };
    let (pio, _) = onewire.release();

    if report_selection && let Some(rom) = selected_rom(&res, pio) {
        println!("selected {}", hex(&rom));
    }
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(OneWireError::SearchAborted) => {
            log::error!("Devices stopped answering during the search");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("1-Wire error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Starts the bus master on the pins given on the command line.
fn start<'a, D: DelayNs>(
    args: &Args,
    pio: &'a mut SimPio,
    delay: D,
) -> Result<PioOneWire<&'a mut SimPio, D>, PioError> {
    let mut builder = PioOneWireBuilder::new(args.pin).with_fifo_threshold(args.threshold);
    if let Some(dir) = args.dir {
        builder = builder.with_direction_pin(dir);
    }
    builder.build(pio, delay)
}

/// The device left selected on the bus by the last command, if exactly one is.
fn selected_rom<E>(res: &Result<(), E>, pio: &SimPio) -> Option<RomCode> {
    res.as_ref().ok()?;
    let mut selected = pio.bus().devices().iter().filter(|d| d.selected());
    match (selected.next(), selected.next()) {
        (Some(dev), None) => Some(dev.rom()),
        _ => None,
    }
}
