// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The result writers.
//!
//! Results stream out of the scan as they are produced: each writer is
//! a single thread draining a deep queue into a gzip-compressed,
//! semicolon-separated CSV file. Creating a writer opens its file
//! immediately (an unwritable output is a startup error, not something
//! to discover hours into a scan), and the files are flushed and
//! finished when the queue stops, so they are valid gzip even if some
//! in-flight results never made it in.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Local;
use csv::WriterBuilder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, trace};

use crate::scan::{DomainNsPair, ScanItem};
use crate::worker::WorkQueue;

/// The timestamp format of scan rows: local time with microseconds.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

////////////////////////////////////////////////////////////////////////
// WRITER THREADS                                                     //
////////////////////////////////////////////////////////////////////////

/// Starts the scan-result writer. Rows are
/// `timestamp;domain;nsip;req_cidr;ans_cidr;ans_scope;ip1,ip2,...`,
/// with empty fields where the response carried nothing.
pub fn spawn_scan_writer(
    path: &Path,
    queue: Arc<WorkQueue<ScanItem>>,
) -> io::Result<JoinHandle<()>> {
    let file = File::create(path)?;
    let path = path.to_owned();
    thread::Builder::new()
        .name("scan writer".to_owned())
        .spawn(move || {
            let mut writer = csv_writer(file);
            while let Some(item) = queue.take() {
                let record = scan_record(&item);
                trace!("writing scan item to file: {:?}", record);
                if let Err(e) = writer.write_record(&record) {
                    error!("failed to write scan row to {}: {}", path.display(), e);
                }
            }
            finish(writer, &path);
        })
}

/// Starts the nameserver-pair writer. Rows are `domain;nsip`.
pub fn spawn_ns_writer(
    path: &Path,
    queue: Arc<WorkQueue<Arc<DomainNsPair>>>,
) -> io::Result<JoinHandle<()>> {
    let file = File::create(path)?;
    let path = path.to_owned();
    thread::Builder::new()
        .name("nameserver writer".to_owned())
        .spawn(move || {
            let mut writer = csv_writer(file);
            while let Some(pair) = queue.take() {
                let record = ns_record(&pair);
                trace!("writing domain-ns pair: {:?}", record);
                if let Err(e) = writer.write_record(&record) {
                    error!(
                        "failed to write nameserver row to {}: {}",
                        path.display(),
                        e
                    );
                }
            }
            finish(writer, &path);
        })
}

fn csv_writer(file: File) -> csv::Writer<GzEncoder<File>> {
    WriterBuilder::new()
        .delimiter(b';')
        .from_writer(GzEncoder::new(file, Compression::default()))
}

/// Flushes the CSV layer and finishes the gzip stream. Failures are
/// logged; there is nobody left to propagate them to at shutdown.
fn finish(mut writer: csv::Writer<GzEncoder<File>>, path: &PathBuf) {
    if let Err(e) = writer.flush() {
        error!("failed to flush {}: {}", path.display(), e);
    }
    match writer.into_inner() {
        Ok(encoder) => {
            if let Err(e) = encoder.finish() {
                error!("failed to finish {}: {}", path.display(), e);
            }
        }
        Err(e) => error!("failed to flush {}: {}", path.display(), e),
    }
}

////////////////////////////////////////////////////////////////////////
// ROW FORMATS                                                        //
////////////////////////////////////////////////////////////////////////

fn scan_record(item: &ScanItem) -> [String; 7] {
    [
        Local::now().format(TIMESTAMP_FORMAT).to_string(),
        item.pair.domain().to_string(),
        item.pair.nsip().map(|ip| ip.to_string()).unwrap_or_default(),
        item.req_subnet.to_string(),
        item.ans_subnet.map(|net| net.to_string()).unwrap_or_default(),
        item.ans_scope
            .map(|scope| scope.to_string())
            .unwrap_or_default(),
        item.ans_ips
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    ]
}

fn ns_record(pair: &DomainNsPair) -> [String; 2] {
    [
        pair.domain().to_string(),
        pair.nsip().map(|ip| ip.to_string()).unwrap_or_default(),
    ]
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use ipnet::Ipv4Net;
    use std::io::Read;
    use std::net::Ipv4Addr;
    use std::process;

    fn item(with_answers: bool) -> ScanItem {
        let pair = DomainNsPair::new("example.test".parse().unwrap());
        pair.record_nsip(Ipv4Addr::new(198, 51, 100, 1));
        ScanItem {
            pair: Arc::new(pair),
            req_subnet: "192.0.2.0/24".parse().unwrap(),
            ans_subnet: with_answers
                .then(|| "192.0.2.0/24".parse::<Ipv4Net>().unwrap()),
            ans_scope: with_answers.then_some(24),
            ans_ips: if with_answers {
                vec![Ipv4Addr::new(192, 0, 2, 10), Ipv4Addr::new(192, 0, 2, 11)]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn scan_record_formats_all_fields() {
        let record = scan_record(&item(true));
        assert_eq!(record[1], "example.test");
        assert_eq!(record[2], "198.51.100.1");
        assert_eq!(record[3], "192.0.2.0/24");
        assert_eq!(record[4], "192.0.2.0/24");
        assert_eq!(record[5], "24");
        assert_eq!(record[6], "192.0.2.10,192.0.2.11");
        // Timestamp like 2023-05-17 13:45:12.123456.
        assert_eq!(record[0].len(), 26);
    }

    #[test]
    fn scan_record_leaves_absent_fields_empty() {
        let record = scan_record(&item(false));
        assert_eq!(record[4], "");
        assert_eq!(record[5], "");
        assert_eq!(record[6], "");
    }

    #[test]
    fn ns_record_formats_both_fields() {
        let pair = DomainNsPair::new("example.test".parse().unwrap());
        pair.record_nsip(Ipv4Addr::new(198, 51, 100, 1));
        assert_eq!(ns_record(&pair), ["example.test", "198.51.100.1"]);
    }

    #[test]
    fn scan_writer_produces_valid_gzip_csv() {
        let path = std::env::temp_dir().join(format!("scopescan-test-{}.csv.gz", process::id()));
        let queue = Arc::new(WorkQueue::new(16));
        let handle = spawn_scan_writer(&path, queue.clone()).unwrap();
        assert!(queue.push(item(true)));
        assert!(queue.push(item(false)));
        // Give the writer a moment to drain, then stop it.
        thread::sleep(std::time::Duration::from_millis(100));
        queue.stop();
        handle.join().unwrap();

        let mut contents = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(";example.test;198.51.100.1;192.0.2.0/24;"));
        assert!(lines[0].ends_with(";192.0.2.10,192.0.2.11"));
        assert!(lines[1].ends_with(";;;"));
    }
}
