use std::{
    io::{self, Write},
    path::PathBuf,
};

use yiilian_core::common::{
    error::Error,
    util::{home_entry, parse_u64, setup_log},
};
use yiilian_log::{Config, Log, Record};

const LOG_DIR_ENV: &str = "YIILIAN_LOG_DIR";
const DEFAULT_LOG_DIR: &str = ".yiilian/log/";
const CONFIG_FILE_NAME: &str = "yiilian-log.yml";
const LOG4RS_FILE_NAME: &str = "log4rs.yml";

const USAGE: &str = "usage: yiilian-log <append VALUE | read OFFSET | offsets | dump | truncate LOWEST | reset>";

fn main() {
    setup_log(LOG4RS_FILE_NAME);

    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Err(error) = run(&args) {
        log::error!("{}", error);
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), Error> {
    let command = match args.first() {
        Some(command) => command.as_str(),
        None => {
            println!("{USAGE}");
            return Ok(());
        }
    };

    let dir = log_dir()?;
    let config = {
        let cfg_file = dir.join(CONFIG_FILE_NAME);
        if cfg_file.exists() {
            Config::from_file(cfg_file)?
        } else {
            Config::default()
        }
    };

    let log = Log::new(&dir, config)?;

    let rst = match (command, args.get(1)) {
        ("append", Some(value)) => {
            let offset = log.append(Record::new(value.clone()))?;
            println!("{offset}");
            Ok(())
        }
        ("read", Some(offset)) => {
            let record = log.read(parse_arg(offset)?)?;
            println!("{}", String::from_utf8_lossy(&record.value));
            Ok(())
        }
        ("offsets", _) => {
            let (low, high) = log.offsets()?;
            println!("{low} {high}");
            Ok(())
        }
        ("dump", _) => {
            let mut stdout = io::stdout().lock();
            io::copy(&mut log.reader()?, &mut stdout)
                .and_then(|_| stdout.flush())
                .map_err(|error| Error::new_file(Some(error.into()), Some("dump failed".to_owned())))
        }
        ("truncate", Some(lowest)) => log.truncate(parse_arg(lowest)?),
        ("reset", _) => log.reset(),
        _ => Err(Error::new_general(USAGE)),
    };

    log.close()?;

    rst
}

fn log_dir() -> Result<PathBuf, Error> {
    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => home_entry(DEFAULT_LOG_DIR),
    }
}

fn parse_arg(arg: &str) -> Result<u64, Error> {
    parse_u64(arg).ok_or_else(|| Error::new_general(&format!("{arg} is not an offset")))
}
