#![forbid(unsafe_code)]

//! Preview classification of attachments.

use serde::Serialize;

use parley_domain::AttachmentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
	Image,
	Video,
	Pdf,
	Text,
	Youtube,
}

const IMAGE_MIMETYPES: &[&str] = &[
	"image/bmp",
	"image/gif",
	"image/jpeg",
	"image/png",
	"image/svg+xml",
	"image/tiff",
	"image/x-icon",
];

const TEXT_MIMETYPES: &[&str] = &["application/javascript", "application/json", "text/css", "text/html", "text/plain"];

const VIDEO_MIMETYPES: &[&str] = &["audio/mpeg", "video/x-matroska", "video/mp4", "video/webm"];

/// Preview kind for an attachment, `None` when it cannot be previewed.
pub fn classify(kind: AttachmentKind, mimetype: Option<&str>, url: Option<&str>) -> Option<FileType> {
	if kind == AttachmentKind::Url {
		let url = url?;
		if url.contains("youtu") {
			return Some(FileType::Youtube);
		}
		let lower = url.to_ascii_lowercase();
		if [".png", ".jpg", ".jpeg", ".gif"].iter().any(|ext| lower.ends_with(ext)) {
			return Some(FileType::Image);
		}
	}

	let mimetype = mimetype?;
	if mimetype == "application/pdf" {
		Some(FileType::Pdf)
	} else if IMAGE_MIMETYPES.contains(&mimetype) {
		Some(FileType::Image)
	} else if TEXT_MIMETYPES.contains(&mimetype) {
		Some(FileType::Text)
	} else if VIDEO_MIMETYPES.contains(&mimetype) {
		Some(FileType::Video)
	} else {
		None
	}
}

/// Lower-cased extension of `filename`, without the dot.
pub fn extension(filename: &str) -> Option<String> {
	let (stem, ext) = filename.rsplit_once('.')?;
	if stem.is_empty() || ext.is_empty() {
		return None;
	}
	Some(ext.to_ascii_lowercase())
}

/// Major part of a mimetype (`image` for `image/png`).
pub fn media_type(mimetype: &str) -> Option<String> {
	mimetype
		.split_once('/')
		.map(|(major, _)| major.to_string())
		.filter(|major| !major.is_empty())
}
