use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use log::{info, LevelFilter};

use dabswitch::{
    AnnouncementSink, Coordinator, HistoryEntry, Preferences, ReceiverLocation, State, TunerPort,
};

mod cli;

use cli::Args;

fn main() {
    match annsim() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn annsim() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    log_setup(&args);

    let coordinator = Coordinator::new(Box::new(PrintingTuner));
    coordinator.register_sink(Box::new(PrintingSink));

    if let Some(path) = &args.prefs {
        let prefs = Preferences::load(Path::new(path));
        coordinator.set_preferences(prefs);
        info!("preferences loaded from {}", path);
    }
    if let Some(code) = &args.location {
        let location: ReceiverLocation = code
            .parse()
            .map_err(|err| anyhow!("invalid --location \"{}\": {}", code, err))?;
        coordinator.set_receiver_location(Some(location));
        info!("receiver location {}", location);
    }

    let reader = input_setup(&args)?;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.context("script read failed")?;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if let Err(err) = dispatch(&coordinator, &args, line) {
            eprintln!("line {}: {:#}", lineno + 1, err);
        }
    }

    println!("final state: {}", coordinator.state());
    Ok(())
}

fn dispatch(coordinator: &Coordinator, args: &Args, line: &str) -> Result<(), anyhow::Error> {
    let mut words = line.split_whitespace();
    let command = words.next().expect("dispatched an empty line");
    let rest: Vec<&str> = words.collect();

    match command {
        "location" => {
            let code = rest.first().ok_or_else(|| anyhow!("missing location code"))?;
            let location: ReceiverLocation = code
                .parse()
                .map_err(|err| anyhow!("invalid location \"{}\": {}", code, err))?;
            coordinator.set_receiver_location(Some(location));
        }
        "service" => {
            let &[sid, subch] = rest.as_slice() else {
                bail!("usage: service <sid> <subch>");
            };
            coordinator.on_original_service_set(parse_u32(sid)?, parse_u32(subch)? as u8);
        }
        "label" => {
            let (sid, name) = rest
                .split_first()
                .ok_or_else(|| anyhow!("usage: label <sid> <name...>"))?;
            coordinator.on_service_label(parse_u32(sid)?, name.join(" "));
        }
        "fig18" => {
            coordinator.on_fig_0_18_payload(&parse_hex(&rest)?, args.long_sids);
        }
        "fig19" => {
            coordinator.on_fig_0_19_payload(&parse_hex(&rest)?);
        }
        "lock" => {
            let subch = rest.first().ok_or_else(|| anyhow!("usage: lock <subch>"))?;
            coordinator.on_tuner_locked(parse_u32(subch)? as u8);
        }
        "tick" => coordinator.on_tick(),
        "return" => {
            if !coordinator.return_now() {
                println!("manual return refused");
            }
        }
        "reset" => coordinator.reset_all(),
        "state" => println!("state: {}", coordinator.state()),
        "history" => {
            for entry in coordinator.history() {
                print_history_entry(&entry);
            }
        }
        other => bail!("unknown command \"{}\"", other),
    }

    Ok(())
}

fn print_history_entry(entry: &HistoryEntry) {
    println!(
        "history: {} \"{}\" on {} for {} s",
        entry.start().format("%H:%M:%S"),
        entry.announcement_type(),
        entry.service_name(),
        entry.duration().as_secs()
    );
}

// Accept "4001 0002 01" or "4001000201"
fn parse_hex(words: &[&str]) -> Result<Vec<u8>, anyhow::Error> {
    let joined: String = words.concat();
    if joined.is_empty() || joined.len() % 2 != 0 {
        bail!("hex payload must be a whole number of bytes");
    }

    (0..joined.len())
        .step_by(2)
        .map(|at| {
            u8::from_str_radix(&joined[at..at + 2], 16)
                .map_err(|_| anyhow!("bad hex byte \"{}\"", &joined[at..at + 2]))
        })
        .collect()
}

fn parse_u32(word: &str) -> Result<u32, anyhow::Error> {
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => word.parse(),
    };
    parsed.map_err(|_| anyhow!("bad number \"{}\"", word))
}

fn input_setup(args: &Args) -> Result<Box<dyn BufRead>, anyhow::Error> {
    if args.input_is_stdin() {
        info!("reading script from standard input");
        Ok(Box::new(io::BufReader::new(io::stdin())))
    } else {
        info!("reading script from \"{}\"", &args.file);
        Ok(Box::new(io::BufReader::new(
            std::fs::File::open(&args.file)
                .with_context(|| format!("unable to open \"{}\"", args.file))?,
        )))
    }
}

fn log_setup(args: &Args) {
    if std::env::var_os("RUST_LOG").is_none() {
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("dabswitch", log_filter)
            .filter_module("annsim", log_filter)
            .init();
    } else {
        pretty_env_logger::init();
    }
}

struct PrintingTuner;

impl TunerPort for PrintingTuner {
    fn retune_to_subchannel(&self, subchannel_id: u8) {
        println!("tuner: retune to subchannel {}", subchannel_id);
    }

    fn restore_original(&self, service_id: u32, subchannel_id: u8) {
        println!(
            "tuner: restore service 0x{:04X} on subchannel {}",
            service_id, subchannel_id
        );
    }
}

struct PrintingSink;

impl AnnouncementSink for PrintingSink {
    fn state_changed(&self, from: State, to: State) {
        println!("state: {} -> {}", from, to);
    }

    fn announcement_finished(&self, entry: &HistoryEntry) {
        println!(
            "finished: \"{}\" after {} s",
            entry.announcement_type(),
            entry.duration().as_secs()
        );
    }
}
