//! Cover art and lyrics embedding with lofty.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::file::TaggedFile;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use tracing::debug;

use super::TagWriter;

/// Writes tags in whatever format the container uses (ID3v2 for mp3,
/// Vorbis comments for flac, MP4 ilst for m4a).
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagWriter;

impl LoftyTagWriter {
    pub fn new() -> Self {
        Self
    }
}

fn open_for_edit(path: &Path) -> Result<TaggedFile> {
    let mut tagged_file = Probe::open(path)
        .with_context(|| format!("Failed to open {:?}", path))?
        .read()
        .with_context(|| format!("Failed to read tags of {:?}", path))?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    Ok(tagged_file)
}

fn write_cover(path: &Path, image: &[u8]) -> Result<()> {
    let mut picture =
        Picture::from_reader(&mut &image[..]).context("Cover is not a supported image")?;
    picture.set_pic_type(PictureType::CoverFront);

    let mut tagged_file = open_for_edit(path)?;
    let tag = tagged_file
        .primary_tag_mut()
        .context("File has no writable tag")?;
    tag.remove_picture_type(PictureType::CoverFront);
    tag.push_picture(picture);

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .with_context(|| format!("Failed to save cover into {:?}", path))
}

fn write_lyrics(path: &Path, lyrics: &str) -> Result<()> {
    let mut tagged_file = open_for_edit(path)?;
    let tag = tagged_file
        .primary_tag_mut()
        .context("File has no writable tag")?;
    tag.insert_text(ItemKey::Lyrics, lyrics.to_string());

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .with_context(|| format!("Failed to save lyrics into {:?}", path))
}

#[async_trait]
impl TagWriter for LoftyTagWriter {
    async fn embed_cover(&self, path: &Path, image: &[u8]) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || {
            write_cover(&path, &image)?;
            debug!("Embedded cover into {:?}", path);
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("Cover writer task failed")?
    }

    async fn embed_lyrics(&self, path: &Path, lyrics: &str) -> Result<()> {
        let path: PathBuf = path.to_path_buf();
        let lyrics = lyrics.to_string();
        tokio::task::spawn_blocking(move || {
            write_lyrics(&path, &lyrics)?;
            debug!("Embedded lyrics into {:?}", path);
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("Lyrics writer task failed")?
    }
}
