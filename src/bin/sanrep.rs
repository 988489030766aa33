extern crate anyhow;
extern crate clap;
#[macro_use]
extern crate log;
extern crate num_cpus;
extern crate rayon;
extern crate sanrep;

use sanrep::config::DEFAULT_SOURCE_ROOT;
use sanrep::{try_parse, ParseConfig, Report, Sanitizer, SanitizerReport};

use anyhow::{bail, Context, Result};
use clap::{App, Arg, ArgGroup};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use simplelog::*;

use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Run log to parse.
struct Input {
    /// File path, `stdin` for standard input.
    name: String,
    content: String,
}

/// JSON document written for one parsed report.
#[derive(Serialize)]
struct Output<'a> {
    #[serde(rename(serialize = "Input"))]
    input: &'a str,
    #[serde(rename(serialize = "Summary"))]
    summary: String,
    #[serde(rename(serialize = "Report"))]
    report: &'a Report,
}

fn main() -> Result<()> {
    let matches = App::new("sanrep")
        .version("0.1.0")
        .about("Parse sanitizer reports into classified stack traces")
        .term_width(90)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .short('l')
                .takes_value(true)
                .default_value("info")
                .possible_values(["info", "debug"])
                .help("Logging level"),
        )
        .arg(
            Arg::new("sanitizer")
                .short('s')
                .long("sanitizer")
                .takes_value(true)
                .value_name("KIND")
                .required(true)
                .validator(|arg| arg.parse::<Sanitizer>().map(|_| ()))
                .help("Sanitizer the target was built with (asan, ubsan, kasan, jazzer, tsan, kcsan)"),
        )
        .arg(
            Arg::new("source-root")
                .long("source-root")
                .takes_value(true)
                .value_name("DIR")
                .default_value(DEFAULT_SOURCE_ROOT)
                .help("Project checkout directory, frames outside of it are dropped"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT_DIR")
                .help("Directory to save reports to"),
        )
        .arg(
            Arg::new("stdout")
                .long("stdout")
                .help("Print reports to stdout"),
        )
        .group(
            ArgGroup::new("out")
                .args(&["stdout", "output"])
                .required(true),
        )
        .arg(
            Arg::new("summary")
                .long("summary")
                .help("Print natural-language summaries instead of JSON reports"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .takes_value(true)
                .value_name("N")
                .validator(|arg| arg.parse::<usize>())
                .help("Number of parallel jobs [default: number of CPUs]"),
        )
        .arg(
            Arg::new("INPUTS")
                .multiple_values(true)
                .takes_value(true)
                .help("Run logs to parse, standard input if omitted"),
        )
        .get_matches();

    // Init log.
    let log_level = if matches.value_of("log-level").unwrap() == "debug" {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(
        log_level,
        ConfigBuilder::new().set_time_to_local(true).build(),
        TerminalMode::Stderr,
    );

    let sanitizer = matches
        .value_of("sanitizer")
        .unwrap()
        .parse::<Sanitizer>()
        .map_err(anyhow::Error::msg)?;
    let config = ParseConfig::new(matches.value_of("source-root").unwrap());
    let summary_only = matches.is_present("summary");

    let output_dir = matches.value_of("output").map(Path::new);
    if let Some(dir) = output_dir {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Couldn't create output directory {}", dir.display()))?;
        } else if !dir.is_dir() {
            bail!("Output path {} is not a directory", dir.display());
        }
    }

    let inputs = read_inputs(matches.values_of("INPUTS").map(|v| v.collect()))?;

    let jobs = if let Some(jobs) = matches.value_of("jobs") {
        jobs.parse::<usize>()?
    } else {
        num_cpus::get()
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.clamp(1, inputs.len().max(1)))
        .build_global()
        .context("Couldn't start thread pool")?;

    let results: Vec<_> = inputs
        .par_iter()
        .map(|input| try_parse(&input.content, sanitizer, &config))
        .collect();

    let mut found = 0;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(Some(report)) => {
                found += 1;
                debug!(
                    "{}: {} ({})",
                    input.name,
                    report.name(),
                    report.cwe().description()
                );
                emit(input, &report, summary_only, output_dir)?;
            }
            Ok(None) => warn!("No {} report found in {}", sanitizer, input.name),
            Err(err) => warn!("Malformed {} report in {}: {}", sanitizer, input.name, err),
        }
    }
    info!("Parsed {} of {} inputs", found, inputs.len());

    Ok(())
}

/// Read run logs from files, or from standard input when no file is given.
fn read_inputs(paths: Option<Vec<&str>>) -> Result<Vec<Input>> {
    let Some(paths) = paths else {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .context("Couldn't read standard input")?;
        return Ok(vec![Input {
            name: "stdin".to_string(),
            content,
        }]);
    };
    paths
        .into_iter()
        .map(|path| {
            let bytes = fs::read(path).with_context(|| format!("Couldn't read {path}"))?;
            Ok(Input {
                name: path.to_string(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
        .collect()
}

/// Print a report or save it to the output directory.
fn emit(
    input: &Input,
    report: &Report,
    summary_only: bool,
    output_dir: Option<&Path>,
) -> Result<()> {
    let (text, extension) = if summary_only {
        (report.summary(), "txt")
    } else {
        let output = Output {
            input: &input.name,
            summary: report.summary(),
            report,
        };
        (serde_json::to_string_pretty(&output)?, "sanrep")
    };

    let Some(dir) = output_dir else {
        println!("{text}");
        return Ok(());
    };
    let stem = Path::new(&input.name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".to_string());
    let path = dir.join(format!("{stem}.{extension}"));
    fs::write(&path, text).with_context(|| format!("Couldn't write {}", path.display()))?;
    info!("Report saved to {}", path.display());
    Ok(())
}
