// src/testdata/mod.rs

//! Synthetic inputs for trying the pipeline without real sequencing data.
//!
//! [`generate`] writes a GC-biased multi-chromosome reference FASTA and, per
//! sample, gzipped FASTQ reads drawn from a mutated copy of that reference.
//! Each sample carries its own SNPs and short indels so variant calling has
//! something to find. Output is deterministic for a given seed.
//!
//! Layout under the output directory:
//!
//! ```text
//! reference/reference.fasta
//! samples/sample_<n><read1_suffix>
//! samples/sample_<n><read2_suffix>   (paired only)
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::SampleSection;
use crate::errors::{Result, SnpflowError};

const FASTA_LINE_WIDTH: usize = 80;
const SNP_RATE: f64 = 0.03;
const INDEL_RATE: f64 = 0.01;
const REPEAT_RATE: f64 = 0.05;
const ERROR_RATE: f64 = 0.001;
const PHRED_OFFSET: u8 = 33;
const BASES: [u8; 4] = *b"ACGT";

/// What to generate.
#[derive(Debug, Clone)]
pub struct TestDataOptions {
    pub output_dir: PathBuf,
    /// Write mate files as well.
    pub paired: bool,
    /// File suffixes; they should match the `[samples]` section that will
    /// read the data back.
    pub naming: SampleSection,
    pub samples: usize,
    pub chromosomes: usize,
    pub chromosome_length: usize,
    pub read_length: usize,
    pub coverage: usize,
    pub seed: u64,
}

impl TestDataOptions {
    /// Three samples over three 50 kb chromosomes at 15x with 150 bp reads.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            paired: false,
            naming: SampleSection::default(),
            samples: 3,
            chromosomes: 3,
            chromosome_length: 50_000,
            read_length: 150,
            coverage: 15,
            seed: 42,
        }
    }

    /// Reads (or read pairs) written per sample.
    pub fn reads_per_sample(&self) -> usize {
        self.chromosomes * self.chromosome_length * self.coverage / self.read_length
    }

    fn check(&self) -> Result<()> {
        for (what, value) in [
            ("samples", self.samples),
            ("chromosomes", self.chromosomes),
            ("read length", self.read_length),
            ("coverage", self.coverage),
        ] {
            if value == 0 {
                return Err(SnpflowError::ConfigError(format!(
                    "test data {what} must be >= 1"
                )));
            }
        }
        if self.chromosome_length < self.read_length {
            return Err(SnpflowError::ConfigError(format!(
                "chromosome length {} is shorter than the read length {}",
                self.chromosome_length, self.read_length
            )));
        }
        if self.paired && self.naming.read1_suffix == self.naming.read2_suffix {
            return Err(SnpflowError::ConfigError(
                "paired test data needs distinct read suffixes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where [`generate`] put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDataSet {
    pub reference: PathBuf,
    pub samples_dir: PathBuf,
    pub samples: Vec<String>,
    pub reads_per_sample: usize,
}

pub fn generate(opts: &TestDataOptions) -> Result<TestDataSet> {
    opts.check()?;

    let reference_dir = opts.output_dir.join("reference");
    let samples_dir = opts.output_dir.join("samples");
    fs::create_dir_all(&reference_dir)?;
    fs::create_dir_all(&samples_dir)?;

    let mut rng = StdRng::seed_from_u64(opts.seed);

    let genome: Vec<(String, Vec<u8>)> = (1..=opts.chromosomes)
        .map(|n| (format!("chr{n}"), random_chromosome(&mut rng, opts.chromosome_length)))
        .collect();
    let reference = reference_dir.join("reference.fasta");
    write_fasta(&reference, &genome)?;
    info!(path = %reference.display(), chromosomes = genome.len(), "wrote reference");

    let reads = opts.reads_per_sample();
    let mut samples = Vec::with_capacity(opts.samples);
    for idx in 1..=opts.samples {
        let name = format!("sample_{idx}");
        let haplotype: Vec<Vec<u8>> = genome
            .iter()
            .map(|(_, seq)| {
                let variants = sample_variants(&mut rng, seq, idx);
                debug!(sample = %name, variants = variants.len(), "applying variants");
                apply_variants(seq, &variants)
            })
            .collect();

        let read1 = samples_dir.join(format!("{name}{}", opts.naming.read1_suffix));
        if opts.paired {
            let read2 = samples_dir.join(format!("{name}{}", opts.naming.read2_suffix));
            write_paired_reads(&mut rng, &name, &haplotype, reads, opts.read_length, &read1, &read2)?;
        } else {
            write_single_reads(&mut rng, &name, &haplotype, reads, opts.read_length, &read1)?;
        }
        info!(sample = %name, reads, paired = opts.paired, "wrote sample reads");
        samples.push(name);
    }

    Ok(TestDataSet {
        reference,
        samples_dir,
        samples,
        reads_per_sample: reads,
    })
}

fn random_base(rng: &mut StdRng) -> u8 {
    BASES[rng.random_range(0..BASES.len())]
}

fn gc_biased_base(rng: &mut StdRng, gc: f64) -> u8 {
    let pick = rng.random_range(0..2);
    if rng.random_bool(gc) {
        b"GC"[pick]
    } else {
        b"AT"[pick]
    }
}

/// Blocks of 500-2000 bp with their own GC content, plus the odd tandem repeat.
fn random_chromosome(rng: &mut StdRng, length: usize) -> Vec<u8> {
    let mut seq = Vec::with_capacity(length);
    while seq.len() < length {
        let gc = rng.random_range(0.3..0.7);
        let block = rng.random_range(500..=2000usize).min(length - seq.len());
        for _ in 0..block {
            seq.push(gc_biased_base(rng, gc));
        }
        if rng.random_bool(REPEAT_RATE) {
            let unit: Vec<u8> = (0..rng.random_range(3..=10)).map(|_| random_base(rng)).collect();
            for _ in 0..rng.random_range(3..=10) {
                seq.extend_from_slice(&unit);
            }
        }
    }
    seq.truncate(length);
    seq
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Variant {
    Snp(u8),
    Insertion(Vec<u8>),
    Deletion(usize),
}

/// Variants for one sample on one chromosome, keyed by position.
///
/// Positions are filtered by sample index so that samples differ from each
/// other as well as from the reference.
fn sample_variants(rng: &mut StdRng, seq: &[u8], sample_idx: usize) -> BTreeMap<usize, Variant> {
    let mut variants = BTreeMap::new();
    let len = seq.len();

    let snps = ((len as f64 * SNP_RATE) as usize).min(len / 2);
    for pos in rand::seq::index::sample(rng, len, snps) {
        let reference = seq[pos];
        let mut alt = random_base(rng);
        while alt == reference {
            alt = random_base(rng);
        }
        if sample_idx % 2 == pos % 2 {
            variants.insert(pos, Variant::Snp(alt));
        }
    }

    if len > 10 {
        let indels = ((len as f64 * INDEL_RATE) as usize).min(len / 4);
        for pos in rand::seq::index::sample(rng, len - 10, indels) {
            let size = rng.random_range(1..=5);
            if rng.random_bool(0.5) {
                let bases = (0..size).map(|_| random_base(rng)).collect();
                if sample_idx % 3 == pos % 3 {
                    variants.insert(pos, Variant::Insertion(bases));
                }
            } else if sample_idx % 3 == (pos % 3 + 1) % 3 {
                variants.insert(pos, Variant::Deletion(size));
            }
        }
    }
    variants
}

fn apply_variants(seq: &[u8], variants: &BTreeMap<usize, Variant>) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    let mut deleted_until = 0;
    for (pos, &base) in seq.iter().enumerate() {
        let mut emitted = base;
        match variants.get(&pos) {
            Some(Variant::Snp(alt)) => emitted = *alt,
            Some(Variant::Insertion(bases)) => out.extend_from_slice(bases),
            Some(Variant::Deletion(size)) => deleted_until = deleted_until.max(pos + size),
            None => {}
        }
        if pos >= deleted_until {
            out.push(emitted);
        }
    }
    out
}

fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|b| match b {
            b'A' => b'T',
            b'T' => b'A',
            b'G' => b'C',
            b'C' => b'G',
            _ => b'N',
        })
        .collect()
}

/// Pad to `length` with random bases.
fn padded(rng: &mut StdRng, mut read: Vec<u8>, length: usize) -> Vec<u8> {
    while read.len() < length {
        read.push(random_base(rng));
    }
    read
}

/// Inject substitution errors and return `(bases, qualities)` as Phred+33.
fn sequenced(rng: &mut StdRng, mut read: Vec<u8>) -> (Vec<u8>, Vec<u8>) {
    let mut quality = Vec::with_capacity(read.len());
    for base in read.iter_mut() {
        if rng.random_bool(ERROR_RATE) {
            let mut wrong = random_base(rng);
            while wrong == *base {
                wrong = random_base(rng);
            }
            *base = wrong;
            quality.push(rng.random_range(5..=20) + PHRED_OFFSET);
        } else {
            quality.push(rng.random_range(30..=40) + PHRED_OFFSET);
        }
    }
    (read, quality)
}

type FastqWriter = BufWriter<GzEncoder<File>>;

fn fastq_writer(path: &Path) -> Result<FastqWriter> {
    let file = File::create(path)?;
    Ok(BufWriter::new(GzEncoder::new(file, Compression::fast())))
}

fn finish_fastq(writer: FastqWriter) -> Result<()> {
    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?;
    Ok(())
}

fn write_record(out: &mut impl Write, id: &str, bases: &[u8], quality: &[u8]) -> Result<()> {
    writeln!(out, "@{id}")?;
    out.write_all(bases)?;
    out.write_all(b"\n+\n")?;
    out.write_all(quality)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn write_single_reads(
    rng: &mut StdRng,
    sample: &str,
    haplotype: &[Vec<u8>],
    reads: usize,
    read_length: usize,
    path: &Path,
) -> Result<()> {
    let mut out = fastq_writer(path)?;
    for i in 0..reads {
        let chrom = &haplotype[rng.random_range(0..haplotype.len())];
        let start = rng.random_range(0..=chrom.len().saturating_sub(read_length));
        let end = (start + read_length).min(chrom.len());
        let read = padded(rng, chrom[start..end].to_vec(), read_length);
        let (bases, quality) = sequenced(rng, read);
        write_record(&mut out, &format!("{sample}_read_{i}"), &bases, &quality)?;
    }
    finish_fastq(out)
}

/// Pairs come from 300-500 bp fragments; R2 is the reverse complement of
/// the fragment's far end.
fn write_paired_reads(
    rng: &mut StdRng,
    sample: &str,
    haplotype: &[Vec<u8>],
    reads: usize,
    read_length: usize,
    read1: &Path,
    read2: &Path,
) -> Result<()> {
    let mut out1 = fastq_writer(read1)?;
    let mut out2 = fastq_writer(read2)?;
    for i in 0..reads {
        let chrom = &haplotype[rng.random_range(0..haplotype.len())];
        let fragment_size = rng.random_range(300..=500usize).min(chrom.len());
        let start = rng.random_range(0..=chrom.len() - fragment_size);
        let fragment = &chrom[start..start + fragment_size];

        let forward = fragment[..read_length.min(fragment.len())].to_vec();
        let reverse = reverse_complement(&fragment[fragment.len().saturating_sub(read_length)..]);

        let forward = padded(rng, forward, read_length);
        let reverse = padded(rng, reverse, read_length);
        let (bases1, quality1) = sequenced(rng, forward);
        let (bases2, quality2) = sequenced(rng, reverse);
        write_record(&mut out1, &format!("{sample}_read_{i}/1"), &bases1, &quality1)?;
        write_record(&mut out2, &format!("{sample}_read_{i}/2"), &bases2, &quality2)?;
    }
    finish_fastq(out1)?;
    finish_fastq(out2)
}

fn write_fasta(path: &Path, genome: &[(String, Vec<u8>)]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (name, seq) in genome {
        writeln!(out, ">{name}")?;
        for line in seq.chunks(FASTA_LINE_WIDTH) {
            out.write_all(line)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;
    Ok(())
}

