//! `pcapherd tar-extract` - pull selected pcap files out of a tarball
//! bytestream.
//!
//! Iterates the (possibly gzipped) archive without unpacking it, writing
//! only entries that match the name pattern. Useful when the tarball is
//! larger than the free disk space.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use flate2::write::GzEncoder;
use regex::Regex;
use tracing::{debug, info};

#[derive(Args)]
pub struct TarExtractArgs {
    /// Input tarball, gzip detected from the file magic
    #[arg(long = "in-tarball", env = "PCAPHERD_TARBALL_IN_FILE")]
    pub in_tarball: PathBuf,

    /// Output directory for extracted files
    #[arg(long = "out-dir", env = "PCAPHERD_TARBALL_OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Only extract entries matching this pattern
    #[arg(long = "file-regexp", env = "PCAPHERD_TARBALL_FILE_REGEXP")]
    pub file_regexp: Option<String>,

    /// Only list matching entries, extract nothing
    #[arg(long, default_value_t = false)]
    pub dryrun: bool,

    /// Compress extracted files with gzip
    #[arg(long = "out-gzip", default_value_t = false)]
    pub out_gzip: bool,
}

pub fn run(args: TarExtractArgs) -> anyhow::Result<()> {
    let pattern = args
        .file_regexp
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid file regexp")?;

    let out_dir = match (&args.out_dir, args.dryrun) {
        (Some(dir), _) => dir.clone(),
        (None, true) => PathBuf::new(),
        (None, false) => anyhow::bail!("missing output dir"),
    };

    let reader = pcapherd_core::io::open(&args.in_tarball)
        .with_context(|| format!("opening {}", args.in_tarball.display()))?;
    let mut archive = tar::Archive::new(reader);

    info!(tarball = %args.in_tarball.display(), "starting tarball reader");
    for entry in archive.entries().context("tarball read")? {
        let mut entry = entry.context("tarball entry read")?;
        let name = entry.path()?.to_string_lossy().into_owned();
        debug!(entry = name.as_str(), "found entry");

        if entry.header().entry_type().is_dir() {
            debug!(entry = name.as_str(), "is a folder, skipping");
            continue;
        }
        if let Some(re) = &pattern {
            if !re.is_match(&name) {
                continue;
            }
        }
        info!(entry = name.as_str(), "matches file pattern");
        if args.dryrun {
            continue;
        }

        // Flatten the archive path into a single file name.
        let mut flat = name.trim_start_matches("./").replace('/', "-");
        if args.out_gzip {
            flat.push_str(".gz");
        }
        let target = out_dir.join(flat);

        let file = std::fs::File::create(&target)
            .with_context(|| format!("creating {}", target.display()))?;
        if args.out_gzip {
            let mut writer = GzEncoder::new(file, flate2::Compression::default());
            std::io::copy(&mut entry, &mut writer)?;
            writer.finish()?.flush()?;
        } else {
            let mut writer = file;
            std::io::copy(&mut entry, &mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}
