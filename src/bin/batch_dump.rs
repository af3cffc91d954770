// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use stonemq_records::message::{for_each_record, DecodedBatch, Payload};
use stonemq_records::{
    global_config, setup_local_tracing, setup_tracing, AppResult, BatchDecoder, PagePool,
    RecordsConfig, GLOBAL_CONFIG,
};
use tracing::{info, warn};

/// Prints the records and control markers of a file holding raw v2 record
/// batches, as found in a fetch response partition.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// File with concatenated record batches
    #[arg(short, long)]
    file: PathBuf,
    /// Optional configuration file
    #[arg(short, long)]
    conf: Option<String>,
    /// Also write logs to hourly files in this directory
    #[arg(short, long)]
    log_dir: Option<String>,
    /// Print keys and values, not only their sizes
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let _guard = match &cli.log_dir {
        Some(log_dir) => Some(setup_tracing(log_dir)?),
        None => {
            setup_local_tracing()?;
            None
        }
    };

    if let Some(conf) = &cli.conf {
        let config = RecordsConfig::set_up_config(conf)?;
        if GLOBAL_CONFIG.set(config).is_err() {
            warn!("configuration already installed, ignoring {}", conf);
        }
    }
    let config = global_config();
    info!("using {:?}", config);

    let mut wire = vec![];
    File::open(&cli.file)?.read_to_end(&mut wire)?;

    let pool = PagePool::from_config(&config.pool);
    let decoder = BatchDecoder::new(pool.clone());
    let batches = decoder.decode(&wire)?;
    info!(
        "{} batches in {} bytes from {}",
        batches.len(),
        wire.len(),
        cli.file.display()
    );

    for batch in batches {
        let metadata = *batch.metadata();
        match batch {
            DecodedBatch::Records(mut batch) => {
                println!(
                    "batch base_offset={} producer_id={} epoch={} transactional={}",
                    metadata.base_offset,
                    metadata.producer_id,
                    metadata.producer_epoch,
                    metadata.attributes.transactional()
                );
                for_each_record(&mut batch, |_, record| {
                    println!(
                        "  offset={} time={:?} key={} value={} headers={}",
                        record.offset,
                        record.time,
                        describe(record.key.as_mut(), cli.verbose)?,
                        describe(record.value.as_mut(), cli.verbose)?,
                        record.headers.len()
                    );
                    Ok(())
                })?;
            }
            DecodedBatch::Control(mut batch) => {
                println!(
                    "control batch base_offset={} producer_id={}",
                    metadata.base_offset, metadata.producer_id
                );
                while let Some(control) = batch.read_control_record()? {
                    let kind = if control.is_commit() {
                        "commit"
                    } else if control.is_abort() {
                        "abort"
                    } else {
                        "unknown"
                    };
                    println!(
                        "  offset={} {} version={} data={} bytes",
                        control.offset,
                        kind,
                        control.version,
                        control.data.len()
                    );
                }
            }
        }
    }

    info!("pages still outstanding: {}", pool.outstanding());
    Ok(())
}

fn describe(payload: Option<&mut Payload>, verbose: bool) -> AppResult<String> {
    let Some(payload) = payload else {
        return Ok("null".to_string());
    };
    let data = payload.read_full()?;
    if verbose {
        Ok(format!("{:?}", String::from_utf8_lossy(&data)))
    } else {
        Ok(format!("{} bytes", data.len()))
    }
}
