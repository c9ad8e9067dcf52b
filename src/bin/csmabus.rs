use clap::{App, Arg, ArgMatches};
use colored::*;
use csmabus::simulation::{SimulationReport, TickOutcome};
use csmabus::{BusSnapshot, PropagationMode, Simulation, SimulationConfig, SlotSymbol, StationConfig};
use std::str::FromStr;
use std::time::Duration;
use tokio::time;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("csmabus")
        .version("0.1.0")
        .author("Network Systems Engineering Team")
        .about("📡 CSMA/CD bus simulator - stations contending for one shared cable")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON simulation config; flags below override its fields")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bus-length")
                .short("l")
                .long("bus-length")
                .value_name("SLOTS")
                .help("Number of slots on the bus; also sets the frame duration to twice this unless the config file or --frame-duration gives one")
                .takes_value(true)
                .validator(|v| validate_number::<usize>(&v, "Bus length")),
        )
        .arg(
            Arg::with_name("frame-duration")
                .long("frame-duration")
                .value_name("TICKS")
                .help("Ticks a frame stays on the wire (default: twice the bus length)")
                .takes_value(true)
                .validator(|v| validate_number::<u32>(&v, "Frame duration")),
        )
        .arg(
            Arg::with_name("ticks")
                .short("t")
                .long("ticks")
                .value_name("TICKS")
                .help("Number of ticks to simulate")
                .takes_value(true)
                .validator(|v| validate_number::<u64>(&v, "Tick count")),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .value_name("SEED")
                .help("Seed for backoff and traffic randomness")
                .takes_value(true)
                .validator(|v| validate_number::<u64>(&v, "Seed")),
        )
        .arg(
            Arg::with_name("probability")
                .short("p")
                .long("probability")
                .value_name("P")
                .help("Per-tick chance an idle station queues a new frame")
                .takes_value(true)
                .validator(|v| validate_number::<f64>(&v, "Probability")),
        )
        .arg(
            Arg::with_name("station")
                .long("station")
                .value_name("POS:ID")
                .help("Attach a station at slot POS with identity ID (repeatable, replaces configured stations)")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .validator(|v| parse_station(&v).map(|_| ())),
        )
        .arg(
            Arg::with_name("symmetric")
                .long("symmetric")
                .help("Use direction-independent propagation instead of the left-to-right scan"),
        )
        .arg(
            Arg::with_name("delay")
                .short("d")
                .long("delay-ms")
                .value_name("MS")
                .help("Pause between ticks when printing the trace")
                .takes_value(true)
                .default_value("0")
                .validator(|v| validate_number::<u64>(&v, "Delay")),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Only print the final report"),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Report format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table"),
        )
        .arg(
            Arg::with_name("no-color")
                .long("no-color")
                .help("Disable colored output"),
        )
        .get_matches();

    if matches.is_present("no-color") {
        colored::control::set_override(false);
    }

    let config = build_config(&matches)?;
    let quiet = matches.is_present("quiet");
    let format = matches.value_of("format").unwrap_or("table");
    let delay_ms = parse_value::<u64>(&matches, "delay")?.unwrap_or(0);

    let mut simulation = match Simulation::new(config) {
        Ok(simulation) => simulation,
        Err(e) => {
            eprintln!("{} Invalid configuration: {}", "❌".red(), e.to_string().bright_red());
            return Err(e.into());
        }
    };

    if !quiet {
        println!("{}", "📡 CSMA/CD Bus Simulator".bright_blue().bold());
        println!("{}", "========================".bright_blue());
    }

    if delay_ms > 0 && !quiet {
        let mut interval = time::interval(Duration::from_millis(delay_ms));
        while !simulation.is_finished() {
            interval.tick().await;
            let outcome = simulation.tick();
            print_tick(&outcome);
        }
    } else {
        simulation.run_with(|outcome| {
            if !quiet {
                print_tick(outcome);
            }
        });
    }

    let report = simulation.report();
    info!(ticks = report.ticks_run, "run complete");
    print_report(&report, format)?;

    Ok(())
}

fn build_config(matches: &ArgMatches<'_>) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    let (mut config, frame_in_file) = match matches.value_of("config") {
        Some(path) => load_config(&std::fs::read_to_string(path)?)?,
        None => (SimulationConfig::default(), false),
    };

    if let Some(bus_length) = parse_value::<usize>(matches, "bus-length")? {
        let frame_given = frame_in_file || matches.is_present("frame-duration");
        apply_bus_length(&mut config, bus_length, frame_given);
    }
    if let Some(frame_duration) = parse_value::<u32>(matches, "frame-duration")? {
        config.frame_duration = frame_duration;
    }
    if let Some(ticks) = parse_value::<u64>(matches, "ticks")? {
        config.tick_count = ticks;
    }
    if let Some(seed) = parse_value::<u64>(matches, "seed")? {
        config.seed = seed;
    }
    if let Some(probability) = parse_value::<f64>(matches, "probability")? {
        config.origination_probability = probability;
    }
    if let Some(values) = matches.values_of("station") {
        config.stations = values.map(parse_station).collect::<Result<Vec<_>, _>>()?;
    }
    if matches.is_present("symmetric") {
        config.propagation = PropagationMode::Symmetric;
    }
    config.record_snapshots = !matches.is_present("quiet");

    Ok(config)
}

/// Parse a JSON config, reporting whether it sets the frame duration itself.
fn load_config(raw: &str) -> Result<(SimulationConfig, bool), serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let frame_in_file = value.get("frame_duration").is_some();
    Ok((serde_json::from_value(value)?, frame_in_file))
}

fn apply_bus_length(config: &mut SimulationConfig, bus_length: usize, frame_given: bool) {
    config.bus_length = bus_length;
    if !frame_given {
        config.frame_duration = u32::try_from(bus_length.saturating_mul(2)).unwrap_or(u32::MAX);
    }
}

fn parse_value<T>(matches: &ArgMatches<'_>, name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match matches.value_of(name) {
        Some(raw) => Ok(Some(raw.parse::<T>()?)),
        None => Ok(None),
    }
}

fn validate_number<T: FromStr>(value: &str, what: &str) -> Result<(), String> {
    value
        .parse::<T>()
        .map(|_| ())
        .map_err(|_| format!("{} must be a valid number", what))
}

fn parse_station(value: &str) -> Result<StationConfig, String> {
    let (position, identity) = value
        .split_once(':')
        .ok_or_else(|| format!("Station '{}' must look like POS:ID", value))?;
    let position = position
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("Station position '{}' is not a slot index", position))?;
    let identity = identity
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("Station identity '{}' is not a number", identity))?;
    Ok(StationConfig::new(position, identity))
}

fn print_tick(outcome: &TickOutcome) {
    if let Some(snapshot) = &outcome.snapshot {
        println!("{} {}", format!("{:>6}", outcome.tick).dimmed(), render_snapshot(snapshot));
    }
}

fn render_snapshot(snapshot: &BusSnapshot) -> String {
    snapshot
        .symbols
        .iter()
        .map(|symbol| {
            let glyph = symbol.glyph().to_string();
            let painted = match symbol {
                SlotSymbol::Empty => glyph.normal(),
                SlotSymbol::Jam => glyph.bright_red().bold(),
                SlotSymbol::Collision => glyph.yellow(),
                SlotSymbol::Station(id) => match id % 4 {
                    0 => glyph.bright_cyan(),
                    1 => glyph.bright_green(),
                    2 => glyph.bright_blue(),
                    _ => glyph.bright_magenta(),
                },
            };
            painted.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_report(report: &SimulationReport, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(report)?),
        "compact" => {
            let status = if report.totals.frames_aborted > 0 {
                "ABORTS".red()
            } else if report.totals.frames_completed > 0 {
                "OK".green()
            } else {
                "PENDING".yellow()
            };
            println!(
                "{} ticks={} delivered={} aborted={} jams={}",
                status,
                report.ticks_run,
                report.totals.frames_completed,
                report.totals.frames_aborted,
                report.totals.jams_sent
            );
        }
        _ => {
            println!();
            println!("{}", "📊 Simulation Report".bright_blue().bold());
            println!("{} {}", "Ticks run:".bright_white(), report.ticks_run);
            println!("{} {} slots, frame {} ticks", "Bus:".bright_white(), report.bus_length, report.frame_duration);
            println!("{} {}", "Seed:".bright_white(), report.seed);
            match report.first_collision_tick {
                Some(tick) => println!("{} tick {}", "First collision:".bright_white(), tick.to_string().yellow()),
                None => println!("{} {}", "First collision:".bright_white(), "none".green()),
            }
            println!("{} {} slots", "Peak occupancy:".bright_white(), report.peak_occupancy);
            println!();
            println!(
                "{}",
                format!(
                    "{:>8} {:>6} {:>14} {:>10} {:>9} {:>8} {:>6} {:>8}",
                    "station", "slot", "state", "delivered", "aborted", "jams", "seen", "max k"
                )
                .bright_white()
            );
            for station in &report.stations {
                println!(
                    "{:>8} {:>6} {:>14} {:>10} {:>9} {:>8} {:>6} {:>8}",
                    station.identity,
                    station.position,
                    format!("{:?}", station.state),
                    station.stats.frames_completed,
                    station.stats.frames_aborted,
                    station.stats.jams_sent,
                    station.stats.jams_received,
                    station.stats.max_backoff_iteration
                );
            }
        }
    }
    Ok(())
}
