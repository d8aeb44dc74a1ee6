//! Flattening of downloaded packs into a type-partitioned output tree.
//!
//! Each input file is classified by extension:
//! - accepted leaf files are copied to `<output>/<ext>/<flattened name>`
//! - archives are expanded into a scratch directory and every member is fed
//!   back through the same procedure with the archive's stem appended to the
//!   name prefix
//! - everything else is ignored
//!
//! Failures are isolated per item: a broken archive or unreadable member is
//! logged and counted, and its siblings are still processed.

mod classify;
mod naming;

pub use classify::{AssetClassifier, ClassifiedKind};
pub use naming::{archive_stem, resolve_final_name, NamePrefix};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveError, ExtractorRegistry};
use crate::config::UnfoldConfig;
use crate::{hash, paths};

/// Archives nested deeper than this are refused (self-containing zips).
pub const MAX_NESTING_DEPTH: usize = 32;

/// Per-item unfold errors
#[derive(Debug, thiserror::Error)]
pub enum UnfoldError {
    #[error("Invalid input {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Archive nesting too deep at {0}")]
    TooDeep(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Unfold statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnfoldStats {
    /// Leaf files written
    pub copied: usize,
    /// Leaf files whose destination already held identical bytes
    pub unchanged: usize,
    /// Archives expanded
    pub archives: usize,
    /// Files skipped by classification
    pub ignored: usize,
    /// Inputs or archive members that failed
    pub failed: usize,
}

/// The recursive classify / place / expand procedure.
pub struct UnfoldPipeline {
    classifier: AssetClassifier,
    registry: ExtractorRegistry,
}

impl Default for UnfoldPipeline {
    fn default() -> Self {
        Self::new(AssetClassifier::default(), ExtractorRegistry::with_defaults())
    }
}

impl UnfoldPipeline {
    pub fn new(classifier: AssetClassifier, registry: ExtractorRegistry) -> Self {
        Self { classifier, registry }
    }

    pub fn from_config(config: &UnfoldConfig) -> Self {
        Self::new(
            AssetClassifier::new(&config.accepted_extensions),
            ExtractorRegistry::with_defaults().with_scratch_root(&config.input_dir),
        )
    }

    /// Process one file with the prefix accumulated so far.
    pub fn process(
        &self,
        path: &Path,
        output_root: &Path,
        prefix: NamePrefix,
        stats: &mut UnfoldStats,
    ) -> Result<(), UnfoldError> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(UnfoldError::InvalidInput {
                    path: path.to_path_buf(),
                    reason: "not a regular file".to_string(),
                })
            }
            Err(e) => {
                return Err(UnfoldError::InvalidInput {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }

        match self.classifier.classify(path) {
            ClassifiedKind::Accepted(ext) => self.place_leaf(path, output_root, &prefix, &ext, stats),
            ClassifiedKind::Archive(format) => {
                if prefix.depth() >= MAX_NESTING_DEPTH {
                    return Err(UnfoldError::TooDeep(path.to_path_buf()));
                }

                let prefix = prefix.merge(&archive_stem(path));
                debug!("Unpacking archive {}", path.display());

                let extracted = self.registry.open(path, format)?.extract_all()?;
                stats.archives += 1;

                for member in extracted.files() {
                    if let Err(e) = self.process(member, output_root, prefix.clone(), stats) {
                        let name = member.strip_prefix(extracted.root()).unwrap_or(member);
                        warn!("Skipping {} in {}: {}", name.display(), path.display(), e);
                        stats.failed += 1;
                    }
                }
                Ok(())
            }
            ClassifiedKind::Ignored => {
                stats.ignored += 1;
                Ok(())
            }
        }
    }

    fn place_leaf(
        &self,
        path: &Path,
        output_root: &Path,
        prefix: &NamePrefix,
        ext: &str,
        stats: &mut UnfoldStats,
    ) -> Result<(), UnfoldError> {
        let final_name = resolve_final_name(prefix, &paths::file_name(path));
        let dest = output_root.join(ext).join(&final_name);
        paths::ensure_parent_dirs(&dest).map_err(|source| UnfoldError::Io {
            path: dest.clone(),
            source,
        })?;

        if hash::same_contents(path, &dest).unwrap_or(false) {
            stats.unchanged += 1;
            return Ok(());
        }

        if dest.exists() {
            debug!("Overwriting {} with {}", dest.display(), path.display());
        }

        fs::copy(path, &dest).map_err(|source| UnfoldError::Io {
            path: dest.clone(),
            source,
        })?;
        stats.copied += 1;
        Ok(())
    }
}

/// Unfold every direct entry of `input_dir` into `output_dir`.
///
/// Only setup failures (output root, input listing) are returned as errors;
/// per-entry failures are logged and counted in [`UnfoldStats::failed`].
pub fn unfold_directory(pipeline: &UnfoldPipeline, input_dir: &Path, output_dir: &Path) -> Result<UnfoldStats> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let mut entries: Vec<PathBuf> = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read asset directory: {}", input_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    info!("Unfolding {} entries from {}", entries.len(), input_dir.display());

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] Unfolding [{bar:40.cyan/blue}] {pos}/{len} | {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut stats = UnfoldStats::default();
    for entry in &entries {
        pb.set_message(paths::file_name(entry));
        if let Err(e) = pipeline.process(entry, output_dir, NamePrefix::new(), &mut stats) {
            warn!("Failed to unfold {}: {}", entry.display(), e);
            stats.failed += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Unfold complete: {} copied, {} unchanged, {} archives, {} ignored, {} failed",
        stats.copied, stats.unchanged, stats.archives, stats.ignored, stats.failed
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{gzip, sevenz_bytes, tar_bytes, write_7z, write_zip, zip_bytes};
    use tempfile::tempdir;

    /// Every file under `root`, relative, with forward slashes, sorted.
    fn tree(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_nested_zip_scenario() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;

        let sub = zip_bytes(&[("icon.png", b"icon")])?;
        write_zip(&input.join("pack.zip"), &[("sub.zip", &sub)])?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/pack_sub_icon.png"]);
        assert_eq!(fs::read(out.join("png/pack_sub_icon.png"))?, b"icon");
        assert_eq!(stats.archives, 2);
        assert_eq!(stats.copied, 1);
        assert_eq!(stats.failed, 0);
        Ok(())
    }

    #[test]
    fn test_text_file_is_ignored() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        fs::write(input.join("readme.txt"), "hello")?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert!(tree(&out).is_empty());
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.failed, 0);
        Ok(())
    }

    #[test]
    fn test_unfolding_twice_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        write_zip(&input.join("pack.zip"), &[("a.png", b"a"), ("b.gif", b"b")])?;

        let pipeline = UnfoldPipeline::default();
        let first = unfold_directory(&pipeline, &input, &out)?;
        let after_first = tree(&out);
        let second = unfold_directory(&pipeline, &input, &out)?;

        assert_eq!(tree(&out), after_first);
        assert_eq!(after_first, vec!["gif/pack_b.gif", "png/pack_a.png"]);
        assert_eq!(first.copied, 2);
        assert_eq!(second.copied, 0);
        assert_eq!(second.unchanged, 2);
        Ok(())
    }

    #[test]
    fn test_three_levels_keep_outer_to_inner_order() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;

        let innermost = zip_bytes(&[("art/hero walk.gif", b"gif")])?;
        let middle = gzip(&tar_bytes(&[("c.zip", &innermost)])?)?;
        write_zip(&input.join("a.zip"), &[("b.tar.gz", &middle)])?;

        unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["gif/a_b.tar_c_hero_walk.gif"]);
        Ok(())
    }

    #[test]
    fn test_compressed_tarball_prefix_keeps_tar() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        fs::write(input.join("pack.tar.gz"), gzip(&tar_bytes(&[("icon.png", b"icon")])?)?)?;

        unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/pack.tar_icon.png"]);
        Ok(())
    }

    #[test]
    fn test_seven_zip_pack() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        write_7z(&input.join("pack.7z"), &[("icon.png", b"icon"), ("sheets/walk.gif", b"walk")])?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["gif/pack_walk.gif", "png/pack_icon.png"]);
        assert_eq!(fs::read(out.join("png/pack_icon.png"))?, b"icon");
        assert_eq!(stats.archives, 1);
        Ok(())
    }

    #[test]
    fn test_seven_zip_inside_zip() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        let inner = sevenz_bytes(&[("icon.png", b"icon")])?;
        write_zip(&input.join("outer.zip"), &[("inner.7z", &inner)])?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/outer_inner_icon.png"]);
        assert_eq!(stats.archives, 2);
        assert_eq!(stats.failed, 0);
        Ok(())
    }

    #[test]
    fn test_scratch_lives_in_input_dir_and_is_removed() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        let sub = zip_bytes(&[("icon.png", b"icon")])?;
        write_zip(&input.join("pack.zip"), &[("sub.zip", &sub)])?;

        let config = UnfoldConfig {
            input_dir: input.clone(),
            output_dir: out.clone(),
            accepted_extensions: vec!["png".to_string()],
        };
        let stats = unfold_directory(&UnfoldPipeline::from_config(&config), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/pack_sub_icon.png"]);
        assert_eq!(stats.failed, 0);
        assert_eq!(tree(&input), vec!["pack.zip"]);
        Ok(())
    }

    #[test]
    fn test_broken_archive_does_not_stop_the_batch() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        fs::write(input.join("broken.zip"), b"not a zip")?;
        fs::write(input.join("logo.svg"), b"<svg/>")?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["svg/logo.svg"]);
        assert_eq!(stats.failed, 1);
        Ok(())
    }

    #[test]
    fn test_broken_member_does_not_stop_siblings() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        write_zip(
            &input.join("pack.zip"),
            &[("broken.7z", b"garbage"), ("ok.png", b"ok")],
        )?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/pack_ok.png"]);
        assert_eq!(stats.failed, 1);
        Ok(())
    }

    #[test]
    fn test_invalid_input() -> Result<()> {
        let dir = tempdir()?;
        let pipeline = UnfoldPipeline::default();
        let mut stats = UnfoldStats::default();

        let missing = pipeline.process(&dir.path().join("missing.png"), dir.path(), NamePrefix::new(), &mut stats);
        assert!(matches!(missing, Err(UnfoldError::InvalidInput { .. })));

        let a_dir = dir.path().join("folder.zip");
        fs::create_dir_all(&a_dir)?;
        let not_file = pipeline.process(&a_dir, dir.path(), NamePrefix::new(), &mut stats);
        assert!(matches!(not_file, Err(UnfoldError::InvalidInput { .. })));
        Ok(())
    }

    #[test]
    fn test_whitespace_in_archive_and_member_names() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        write_zip(&input.join("My Pack.zip"), &[("hero sprite.PNG", b"x")])?;

        unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/My_Pack_hero_sprite.PNG"]);
        Ok(())
    }

    #[test]
    fn test_colliding_names_overwrite() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        write_zip(&input.join("a.zip"), &[("b_c.png", b"first")])?;
        write_zip(&input.join("a_b.zip"), &[("c.png", b"second")])?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/a_b_c.png"]);
        assert_eq!(fs::read(out.join("png/a_b_c.png"))?, b"second");
        assert_eq!(stats.copied, 2);
        Ok(())
    }

    #[test]
    fn test_hidden_members_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("assets");
        let out = dir.path().join("out");
        fs::create_dir_all(&input)?;
        write_zip(
            &input.join("pack.zip"),
            &[("__MACOSX/._icon.png", b"resource fork"), ("icon.png", b"icon"), ("LICENSE", b"mit")],
        )?;

        let stats = unfold_directory(&UnfoldPipeline::default(), &input, &out)?;

        assert_eq!(tree(&out), vec!["png/pack_icon.png"]);
        assert_eq!(stats.ignored, 2);
        Ok(())
    }
}
