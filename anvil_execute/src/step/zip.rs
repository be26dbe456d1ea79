/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This source code is licensed under both the MIT license found in the
 * LICENSE-MIT file in the root directory of this source tree and the Apache
 * License, Version 2.0 found in the LICENSE-APACHE file in the root directory
 * of this source tree.
 */

//! Archive manipulation steps: repacking entries with a different
//! compression level and scrubbing timestamps for deterministic output.

use std::fs::File;
use std::io;
use std::io::Read;

use anyhow::Context;
use async_trait::async_trait;
use indexmap::IndexSet;
use zip::write::FileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

use anvil_core::fs::project::ProjectRelativePathBuf;

use crate::context::StepExecutionContext;
use crate::step::Step;
use crate::step::StepExecutionResult;

/// The compression applied to repacked entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipCompressionLevel {
    /// STORE the entry uncompressed. Required when an outer solid compressor
    /// (e.g. xz over a whole jar) does the real work.
    None,
    Default,
}

impl ZipCompressionLevel {
    fn method(self) -> CompressionMethod {
        match self {
            ZipCompressionLevel::None => CompressionMethod::Stored,
            ZipCompressionLevel::Default => CompressionMethod::Deflated,
        }
    }
}

/// Rewrites an archive, re-encoding the named entries at the given
/// compression level and copying every other entry through unchanged.
#[derive(Debug)]
pub struct RepackZipEntriesStep {
    source: ProjectRelativePathBuf,
    destination: ProjectRelativePathBuf,
    entries: IndexSet<String>,
    compression_level: ZipCompressionLevel,
}

impl RepackZipEntriesStep {
    pub fn new(
        source: ProjectRelativePathBuf,
        destination: ProjectRelativePathBuf,
        entries: impl IntoIterator<Item = String>,
        compression_level: ZipCompressionLevel,
    ) -> Self {
        RepackZipEntriesStep {
            source,
            destination,
            entries: entries.into_iter().collect(),
            compression_level,
        }
    }
}

#[async_trait]
impl Step for RepackZipEntriesStep {
    fn short_name(&self) -> &'static str {
        "repack_zip"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("repack {} -> {}", self.source, self.destination)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let source_path = ctx.fs().resolve(&self.source);
        let destination_path = ctx.fs().resolve(&self.destination);

        let source = File::open(&source_path)
            .with_context(|| format!("open({})", source_path.display()))?;
        let mut archive = ZipArchive::new(source)
            .with_context(|| format!("read zip {}", self.source))?;
        let destination = File::create(&destination_path)
            .with_context(|| format!("create({})", destination_path.display()))?;
        let mut writer = ZipWriter::new(destination);

        for i in 0..archive.len() {
            let name = archive.by_index_raw(i)?.name().to_owned();
            if self.entries.contains(&name) {
                let mut entry = archive.by_index(i)?;
                let mut contents = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut contents)?;
                let options = FileOptions::default()
                    .compression_method(self.compression_level.method());
                writer.start_file(name, options)?;
                io::Write::write_all(&mut writer, &contents)?;
            } else {
                let entry = archive.by_index_raw(i)?;
                writer.raw_copy_file(entry)?;
            }
        }
        writer.finish()?;
        Ok(StepExecutionResult::success())
    }
}

// MS-DOS timestamp for 1985-02-01 00:00:00, the fixed instant scrubbed
// archives carry. Chosen over the DOS epoch because some tooling rejects a
// zeroed date field.
const DOS_FAKE_DATE: u16 = ((1985 - 1980) << 9) | (2 << 5) | 1;
const DOS_FAKE_TIME: u16 = 0;

const LOCAL_FILE_HEADER_SIG: u32 = 0x04034b50;
const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054b50;

/// Overwrites every entry timestamp in the archive, in both the central
/// directory and the local file headers, so that archives built from the
/// same inputs are byte-for-byte identical. Works on the raw bytes; the
/// entry data itself is untouched.
#[derive(Debug)]
pub struct ZipScrubberStep {
    path: ProjectRelativePathBuf,
}

impl ZipScrubberStep {
    pub fn new(path: ProjectRelativePathBuf) -> Self {
        ZipScrubberStep { path }
    }

    fn scrub(bytes: &mut [u8]) -> anyhow::Result<()> {
        let eocd = Self::find_end_of_central_directory(bytes)?;
        let entries = read_u16(bytes, eocd + 10)? as usize;
        let mut central = read_u32(bytes, eocd + 16)? as usize;

        for _ in 0..entries {
            if read_u32(bytes, central)? != CENTRAL_DIR_HEADER_SIG {
                anyhow::bail!("malformed central directory header at offset {}", central);
            }
            write_u16(bytes, central + 12, DOS_FAKE_TIME)?;
            write_u16(bytes, central + 14, DOS_FAKE_DATE)?;

            let local = read_u32(bytes, central + 42)? as usize;
            if read_u32(bytes, local)? != LOCAL_FILE_HEADER_SIG {
                anyhow::bail!("malformed local file header at offset {}", local);
            }
            write_u16(bytes, local + 10, DOS_FAKE_TIME)?;
            write_u16(bytes, local + 12, DOS_FAKE_DATE)?;

            let name_len = read_u16(bytes, central + 28)? as usize;
            let extra_len = read_u16(bytes, central + 30)? as usize;
            let comment_len = read_u16(bytes, central + 32)? as usize;
            central += 46 + name_len + extra_len + comment_len;
        }
        Ok(())
    }

    /// The end-of-central-directory record is at the very end of the file,
    /// save for an optional comment of at most 64KiB; scan backwards for its
    /// signature.
    fn find_end_of_central_directory(bytes: &[u8]) -> anyhow::Result<usize> {
        const MIN_EOCD_SIZE: usize = 22;
        if bytes.len() < MIN_EOCD_SIZE {
            anyhow::bail!("too small to be a zip archive ({} bytes)", bytes.len());
        }
        let lower_bound = bytes.len().saturating_sub(MIN_EOCD_SIZE + u16::MAX as usize);
        let mut offset = bytes.len() - MIN_EOCD_SIZE;
        loop {
            if read_u32(bytes, offset)? == END_OF_CENTRAL_DIR_SIG {
                return Ok(offset);
            }
            if offset == lower_bound {
                anyhow::bail!("no end-of-central-directory record found");
            }
            offset -= 1;
        }
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> anyhow::Result<u16> {
    let slice = bytes
        .get(offset..offset + 2)
        .context("truncated zip archive")?;
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> anyhow::Result<u32> {
    let slice = bytes
        .get(offset..offset + 4)
        .context("truncated zip archive")?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

fn write_u16(bytes: &mut [u8], offset: usize, value: u16) -> anyhow::Result<()> {
    let slice = bytes
        .get_mut(offset..offset + 2)
        .context("truncated zip archive")?;
    slice.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[async_trait]
impl Step for ZipScrubberStep {
    fn short_name(&self) -> &'static str {
        "zip_scrub"
    }

    fn description(&self, _ctx: &StepExecutionContext) -> String {
        format!("scrub zip timestamps in {}", self.path)
    }

    async fn execute(&self, ctx: &StepExecutionContext) -> anyhow::Result<StepExecutionResult> {
        let mut bytes = ctx.fs().read(&self.path)?;
        Self::scrub(&mut bytes).with_context(|| format!("scrubbing {}", self.path))?;
        ctx.fs().write(&self.path, bytes)?;
        Ok(StepExecutionResult::success())
    }
}
