use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::error::KiraError;
use crate::kmer::is_nucleotide;
use crate::stats::NucleotideStats;

pub const CDS_MARKER: char = '>';

pub const START_CODONS: [&str; 8] = ["ATG", "GTG", "TTG", "CTG", "ATT", "ATC", "ATA", "TTA"];
pub const STOP_CODONS: [&str; 3] = ["TAA", "TAG", "TGA"];

static LOCATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[location=([^\]]*)\]").expect("valid location regex"));
pub fn is_valid_sequence(sequence: &str) -> bool {
    let len = sequence.len();
    len > 0
        && len % 3 == 0
        && sequence.bytes().all(is_nucleotide)
        && START_CODONS.contains(&&sequence[..3])
        && STOP_CODONS.contains(&&sequence[len - 3..])
}

pub fn locators_valid(header: &str) -> Option<bool> {
    let location = LOCATION_RE.captures(header)?.get(1)?.as_str();
    let ranges: String = location
        .replace("complement(", "")
        .replace("join(", "")
        .replace("order(", "")
        .replace(')', "");
    let valid = !ranges.trim().is_empty() && ranges.split(',').all(range_increasing);
    Some(valid)
}

fn range_increasing(range: &str) -> bool {
    let Some((start, end)) = range.trim().split_once("..") else {
        return false;
    };
    let bound = |text: &str| text.trim().trim_start_matches(['<', '>']).parse::<u64>();
    matches!((bound(start), bound(end)), (Ok(start), Ok(end)) if start < end)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideChannels {
    pub gene_text: bool,
    pub genome_text: bool,
}

pub fn side_channel_path(root: &Utf8Path, organism_path: &Utf8Path, accession: &str) -> Utf8PathBuf {
    root.join(organism_path).join(format!("{accession}.txt"))
}

struct RawSink {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
}

impl RawSink {
    fn create(path: Utf8PathBuf) -> Result<Self, KiraError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(format!("{parent}: {err}")))?;
        }
        let file = File::create(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, line: &str) -> Result<(), KiraError> {
        writeln!(self.writer, "{line}")
            .map_err(|err| KiraError::Filesystem(format!("{}: {err}", self.path)))
    }

    fn finish(mut self) -> Result<(), KiraError> {
        self.writer
            .flush()
            .map_err(|err| KiraError::Filesystem(format!("{}: {err}", self.path)))
    }
}

#[derive(Default)]
pub struct RawSinks {
    gene: Option<RawSink>,
    genome: Option<RawSink>,
}

impl RawSinks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn open(
        config: &Config,
        channels: SideChannels,
        organism_path: Option<&Utf8Path>,
        accession: &str,
    ) -> Result<Self, KiraError> {
        let Some(organism_path) = organism_path else {
            return Ok(Self::none());
        };
        let gene = if channels.gene_text {
            Some(RawSink::create(side_channel_path(
                &config.gene_text_root,
                organism_path,
                accession,
            ))?)
        } else {
            None
        };
        let genome = if channels.genome_text {
            Some(RawSink::create(side_channel_path(
                &config.genome_text_root,
                organism_path,
                accession,
            ))?)
        } else {
            None
        };
        Ok(Self { gene, genome })
    }

    pub fn is_active(&self) -> bool {
        self.gene.is_some() || self.genome.is_some()
    }

    fn echo(&mut self, line: &str) -> Result<(), KiraError> {
        if let Some(sink) = self.gene.as_mut() {
            sink.write_line(line)?;
        }
        if let Some(sink) = self.genome.as_mut() {
            sink.write_line(line)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<(), KiraError> {
        if let Some(sink) = self.gene {
            sink.finish()?;
        }
        if let Some(sink) = self.genome {
            sink.finish()?;
        }
        Ok(())
    }
}

/// Extracts the validated coding sequences of one record, updating the CDS
/// counters of `stats`. Every line read is echoed to `sinks`.
///
/// Fails with [`KiraError::EmptyInput`] when the stream holds no non-empty line.
pub fn extract_sequences<R: BufRead>(
    reader: R,
    accession: &str,
    stats: &mut NucleotideStats,
    sinks: &mut RawSinks,
) -> Result<Vec<String>, KiraError> {
    let mut sequences = Vec::new();
    let mut is_empty = true;
    let mut lines = reader.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.map_err(|err| KiraError::Stream(format!("{accession}: {err}")))?;
        if !line.is_empty() {
            is_empty = false;
        }
        sinks.echo(&line)?;

        if !line.starts_with(CDS_MARKER) || locators_valid(&line) != Some(true) {
            continue;
        }

        let mut sequence = String::new();
        while let Some(next) = lines.next_if(|next| match next {
            Ok(next) => !next.starts_with(CDS_MARKER),
            Err(_) => true,
        }) {
            let next = next.map_err(|err| KiraError::Stream(format!("{accession}: {err}")))?;
            if !next.is_empty() {
                is_empty = false;
            }
            sinks.echo(&next)?;
            sequence.push_str(next.trim_end());
        }

        if is_valid_sequence(&sequence) {
            stats.record_accepted();
            sequences.push(sequence);
        } else {
            stats.record_rejected();
        }
    }

    if is_empty {
        return Err(KiraError::EmptyInput(accession.to_string()));
    }

    debug!(
        accession = %accession,
        accepted = sequences.len(),
        rejected = stats.rejected_cds,
        "extracted coding sequences"
    );
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    fn record(features: &[(&str, &[&str])]) -> String {
        let mut text = String::new();
        for (location, lines) in features {
            text.push_str(&format!(">lcl|NC_000913.3_cds_1 [gene=x] [location={location}]\n"));
            for line in *lines {
                text.push_str(line);
                text.push('\n');
            }
        }
        text
    }

    fn extract(text: &str) -> (Result<Vec<String>, KiraError>, NucleotideStats) {
        let mut stats = NucleotideStats::default();
        let result = extract_sequences(
            Cursor::new(text.as_bytes()),
            "NC_000913",
            &mut stats,
            &mut RawSinks::none(),
        );
        (result, stats)
    }

    #[test]
    fn validation_rules() {
        assert!(is_valid_sequence("ATGAAATAG"));
        assert!(!is_valid_sequence("ATGAAATA"));
        assert!(!is_valid_sequence("ATGAAANAG"));
        assert!(!is_valid_sequence("CCCAAATAG"));
        assert!(!is_valid_sequence("ATGAAACCC"));
        assert!(!is_valid_sequence(""));
    }

    #[test]
    fn locator_checks() {
        assert_eq!(locators_valid("> [location=190..255]"), Some(true));
        assert_eq!(
            locators_valid("> [location=complement(join(10..20,30..40))]"),
            Some(true)
        );
        assert_eq!(locators_valid("> [location=join(10..20,40..30)]"), Some(false));
        assert_eq!(locators_valid("> [location=20..20]"), Some(false));
        assert_eq!(locators_valid("> [location=<1..>9]"), Some(true));
        assert_eq!(locators_valid("> [location=10..>5]"), Some(false));
        assert_eq!(locators_valid("> [location=]"), Some(false));
        assert_eq!(locators_valid("> [location=join(1..9,20..>3)]"), Some(false));
        assert_eq!(locators_valid("> [location=join(1..9,,20..30)]"), Some(false));
        assert_eq!(locators_valid("> [location=42]"), Some(false));
        assert_eq!(locators_valid("> [gene=thrL]"), None);
    }

    #[test]
    fn sequence_spans_lines_until_next_header() {
        let text = record(&[
            ("1..9", &["ATGA", "AATAG"]),
            ("20..28", &["ATGAAANAG"]),
            ("30..38", &["GTGCCCTGA"]),
        ]);
        let (result, stats) = extract(&text);
        let sequences = result.unwrap();
        assert_eq!(sequences, vec!["ATGAAATAG", "GTGCCCTGA"]);
        assert_eq!(stats.total_cds, 3);
        assert_eq!(stats.rejected_cds, 1);
        assert_eq!(stats.accepted_cds() as usize, sequences.len());
    }

    #[test]
    fn invalid_locator_skips_feature_without_counting() {
        let text = record(&[("9..1", &["ATGAAATAG"]), ("1..9", &["ATGAAATAG"])]);
        let (result, stats) = extract(&text);
        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(stats.total_cds, 1);
        assert_eq!(stats.rejected_cds, 0);
    }

    #[test]
    fn record_without_features_is_not_empty() {
        let (result, stats) = extract("no features here\n");
        assert!(result.unwrap().is_empty());
        assert_eq!(stats.total_cds, 0);
    }

    #[test]
    fn blank_stream_is_empty_input() {
        let (result, _) = extract("\n\n");
        assert_matches!(result, Err(KiraError::EmptyInput(acc)) if acc == "NC_000913");
        let (result, _) = extract("");
        assert_matches!(result, Err(KiraError::EmptyInput(_)));
    }

    #[test]
    fn sinks_receive_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let config = Config {
            gene_text_root: root.join("Gene"),
            genome_text_root: root.join("Genome"),
            ..Config::default()
        };
        let channels = SideChannels {
            gene_text: true,
            genome_text: true,
        };
        let organism = Utf8Path::new("Bacteria/Proteobacteria/Gamma/E coli");
        let text = record(&[("1..9", &["ATGAAATAG"])]);

        let mut sinks = RawSinks::open(&config, channels, Some(organism), "NC_000913").unwrap();
        assert!(sinks.is_active());
        let mut stats = NucleotideStats::default();
        extract_sequences(Cursor::new(text.as_bytes()), "NC_000913", &mut stats, &mut sinks)
            .unwrap();
        sinks.finish().unwrap();

        for root in [&config.gene_text_root, &config.genome_text_root] {
            let written =
                fs::read_to_string(side_channel_path(root, organism, "NC_000913")).unwrap();
            assert_eq!(written, text);
        }
    }

    #[test]
    fn genes_without_path_open_no_sink() {
        let channels = SideChannels {
            gene_text: true,
            genome_text: false,
        };
        let sinks = RawSinks::open(&Config::default(), channels, None, "NC_1").unwrap();
        assert!(!sinks.is_active());
    }
}
