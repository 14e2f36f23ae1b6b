use clap::{Parser, Subcommand};
use picoglitcher::{GlitchReport, Picocoder};
use std::error::Error;
use std::io::Write;
use std::time::Duration;

/// One-shot commands for the picocoder glitch controller.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial number of the picocoder to use.
    #[arg(short, long, global = true)]
    serial: Option<String>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    Ping,
    /// Set the glitch voltage code.
    SetVoltage { code: u8 },
    /// Set the preparation voltage code.
    SetPrepVoltage { code: u8 },
    /// Set the voltage code restored after the glitch.
    SetRestoreVoltage { code: u8 },
    /// Set the delay between trigger and glitch, in us.
    SetExtOffset { us: u32 },
    /// Set how long the glitch voltage is held, in us.
    SetWidth { us: u32 },
    /// Arm the glitch handler and wait for results.
    Arm {
        /// Integers the target sends with its DONE byte.
        #[arg(default_value_t = 0)]
        expected_ints: u8,
        /// Number of results to wait for (interrupt mode reports every glitch).
        #[arg(short, long, default_value_t = 1)]
        results: u32,
        /// Seconds to wait for each result.
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
    Disarm,
    /// Run the glitch sequence immediately.
    Force,
    /// Check that the target runs stable at the current voltage.
    TargetPing {
        #[arg(long)]
        slow: bool,
    },
    /// Measure the trigger-to-loop offset.
    MeasureLoop,
    /// Estimate the offset with the differential method.
    EstimateOffset,
    /// Toggle the debug pin on the next target byte.
    ToggleDebugPin,
    /// Single 10 us pulse on the debug pin.
    DebugPulse,
    /// Relay target UART output until Ctrl+C.
    UartEcho,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut device = Picocoder::new(cli.serial.as_deref()).await?;

    match cli.command {
        Cmd::Ping => println!("{}", if device.ping().await? { "PONG" } else { "no answer" }),
        Cmd::SetVoltage { code } => device.set_voltage(code).await?,
        Cmd::SetPrepVoltage { code } => device.set_prep_voltage(code).await?,
        Cmd::SetRestoreVoltage { code } => device.set_restore_voltage(code).await?,
        Cmd::SetExtOffset { us } => device.set_ext_offset(us).await?,
        Cmd::SetWidth { us } => device.set_width(us).await?,
        Cmd::Arm {
            expected_ints,
            results,
            timeout,
        } => {
            device.arm(expected_ints).await?;
            println!("Armed, waiting for {} result(s)", results);
            for _ in 0..results {
                let report = device
                    .next_report(expected_ints, Duration::from_secs(timeout))
                    .await?;
                print_report(&report);
            }
        }
        Cmd::Disarm => device.disarm().await?,
        Cmd::Force => device.force().await?,
        Cmd::TargetPing { slow } => {
            let stable = device.target_ping(slow).await?;
            println!("Target {}", if stable { "stable" } else { "not reached" });
        }
        Cmd::MeasureLoop => println!("Loop offset: {} us", device.measure_loop_duration().await?),
        Cmd::EstimateOffset => println!("Estimated offset: {} us", device.estimate_offset().await?),
        Cmd::ToggleDebugPin => {
            let toggled = device.toggle_debug_pin().await?;
            println!("Debug pin {}", if toggled { "toggled" } else { "not toggled: no target data" });
        }
        Cmd::DebugPulse => device.debug_pulse().await?,
        Cmd::UartEcho => {
            device.uart_echo().await?;
            println!("Relaying target output, Ctrl+C to stop");
            let mut stdout = std::io::stdout();
            loop {
                tokio::select! {
                    data = device.read_until_idle(Duration::from_millis(50), Duration::from_millis(500)) => {
                        stdout.write_all(&data?)?;
                        stdout.flush()?;
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            return Ok(());
        }
    }

    println!("OK");
    Ok(())
}

fn print_report(report: &GlitchReport) {
    match report {
        GlitchReport::Alive(values) => {
            println!("Alive:");
            for (i, v) in values.iter().enumerate() {
                println!("  [{}] {:#010x} ({})", i, v, v);
            }
        }
        GlitchReport::CrashDump(dump) => {
            println!("Crash dump ({} bytes): {}", dump.len(), hex::encode(dump));
            println!("{}", String::from_utf8_lossy(dump));
        }
        other => println!("{}", other),
    }
}
