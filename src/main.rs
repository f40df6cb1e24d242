
use log::{LevelFilter, debug, error, info};
use mecphase::cli::{Settings, check_settings, get_raw_settings};
use mecphase::data_types::supports::{SupportRecord, load_supports};
use mecphase::haplotyper::{HaplotypeResult, PhaseError, haplotype_with_config};
use mecphase::writers::label_writer::LabelWriter;
use mecphase::writers::phase_stats::StatsWriter;
use std::collections::BTreeMap;
use std::sync::{Arc, mpsc};
use std::time::Instant;
use threadpool::ThreadPool;

/// Prints a result to stdout and writes it to any optional outputs
/// # Arguments
/// * `haplotypes` - the haplotype count the result is for
/// * `result` - the solved result
/// * `label_writer` - optional, per-read label output
/// * `stats_writer` - optional, per-run statistics output
fn process_result(
    haplotypes: usize,
    result: &HaplotypeResult,
    label_writer: &mut Option<LabelWriter>,
    stats_writer: &mut Option<StatsWriter>
) {
    let label_line: Vec<String> = result.labels.iter().map(|l| l.to_string()).collect();
    println!("{}", label_line.join(" "));
    println!("{}", result.cost);

    if let Some(writer) = label_writer.as_mut() {
        if let Err(e) = writer.write_labels(haplotypes, result) {
            error!("Error while writing labels for k={}: {}", haplotypes, e);
            std::process::exit(exitcode::IOERR);
        }
    }
    if let Some(writer) = stats_writer.as_mut() {
        if let Err(e) = writer.write_stats(haplotypes, result) {
            error!("Error while writing statistics for k={}: {}", haplotypes, e);
            std::process::exit(exitcode::IOERR);
        }
    }
}

/// Unwraps a haplotyping result or exits with a data error
fn check_result(haplotypes: usize, result: Result<HaplotypeResult, PhaseError>) -> HaplotypeResult {
    match result {
        Ok(r) => {
            info!(
                "Solved k={}: cost = {}, max partitions = {}, CPU time = {:.3}s",
                haplotypes, r.cost, r.statistics.max_partitions, r.statistics.cpu_seconds
            );
            r
        },
        Err(e) => {
            error!("Error while haplotyping with k={}: {}", haplotypes, e);
            std::process::exit(exitcode::DATAERR);
        }
    }
}

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    // okay, now we can check all the other settings
    let cli_settings: Settings = check_settings(settings);

    let supports: Vec<SupportRecord> = match load_supports(&cli_settings.supports_filename) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while loading supports: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    let mut label_writer: Option<LabelWriter> = match cli_settings.labels_filename {
        Some(ref filename) => {
            match LabelWriter::new(filename) {
                Ok(lw) => Some(lw),
                Err(e) => {
                    error!("Error during label writer creation: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            }
        },
        None => None
    };

    let mut stats_writer: Option<StatsWriter> = match cli_settings.stats_filename {
        Some(ref filename) => {
            match StatsWriter::new(filename) {
                Ok(sw) => Some(sw),
                Err(e) => {
                    error!("Error during statistics writer creation: {}", e);
                    std::process::exit(exitcode::IOERR);
                }
            }
        },
        None => None
    };

    let start_time: Instant = Instant::now();
    let config = cli_settings.haplotyper_config();
    info!("Haplotyping starting...");
    if cli_settings.threads <= 1 || cli_settings.haplotypes.len() <= 1 {
        for &k in cli_settings.haplotypes.iter() {
            debug!("Starting k={}", k);
            let result: HaplotypeResult = check_result(k, haplotype_with_config(&supports, k, &config));
            process_result(k, &result, &mut label_writer, &mut stats_writer);
        }
    } else {
        info!("Starting job pool with {} threads...", cli_settings.threads);
        let pool = ThreadPool::new(cli_settings.threads);
        let (tx, rx) = mpsc::channel();
        let arc_supports: Arc<Vec<SupportRecord>> = Arc::new(supports);

        for &k in cli_settings.haplotypes.iter() {
            let tx = tx.clone();
            let arc_supports = arc_supports.clone();
            let config = config.clone();
            pool.execute(move|| {
                let result = haplotype_with_config(&arc_supports, k, &config);
                tx.send((k, result)).expect("channel will be there waiting for the pool");
            });
        }
        // only the workers hold senders now, so a dead pool ends `recv` instead of blocking
        drop(tx);

        // results arrive in any order, but they are reported in ascending k
        let mut pending: BTreeMap<usize, HaplotypeResult> = BTreeMap::new();
        let mut next_index: usize = 0;
        while next_index < cli_settings.haplotypes.len() {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }
            let (k, result) = match rx.recv() {
                Ok(r) => r,
                Err(e) => {
                    error!("Error while receiving results: {}", e);
                    std::process::exit(exitcode::SOFTWARE);
                }
            };
            pending.insert(k, check_result(k, result));

            while let Some(result) = cli_settings.haplotypes.get(next_index).and_then(|k| pending.remove(k)) {
                process_result(cli_settings.haplotypes[next_index], &result, &mut label_writer, &mut stats_writer);
                next_index += 1;
            }
        }
    }

    info!("Finished {} haplotype counts in {:.3} seconds.", cli_settings.haplotypes.len(), start_time.elapsed().as_secs_f64());
    std::process::exit(exitcode::OK);
}
