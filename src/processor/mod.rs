use strum::IntoStaticStr;

pub mod encoder;

pub use encoder::{decode, encode};

/// The formats images can be re-encoded to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
}

impl ImageKind {
    #[inline]
    pub fn as_file_extension(&self) -> &'static str {
        self.into()
    }

    pub fn as_content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

impl From<ImageKind> for image::ImageFormat {
    fn from(kind: ImageKind) -> Self {
        match kind {
            ImageKind::Png => Self::Png,
            ImageKind::Jpeg => Self::Jpeg,
            ImageKind::Webp => Self::WebP,
        }
    }
}
