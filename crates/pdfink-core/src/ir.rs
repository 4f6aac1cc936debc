//! Document intermediate representation as delivered by the backend.
//!
//! The IR is an immutable snapshot. Edits never touch it; they flow through the patch
//! protocol and come back as a fresh IR on the next fetch.

use crate::geometry::serde_matrix;
use kurbo::{Affine, Rect, Size};
use serde::{Deserialize, Serialize};

/// Kind of an editable page object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Text,
    Image,
    Path,
}

impl ObjectKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Text => "text",
            ObjectKind::Image => "image",
            ObjectKind::Path => "path",
        }
    }
}

/// Whole-document snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    pub pages: Vec<Page>,
}

impl DocumentIr {
    /// Parse an IR payload.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize the IR back to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Get a page by its index (not its position in `pages`).
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.iter().find(|p| p.index == index)
    }

    /// Total number of editable objects across pages.
    pub fn object_count(&self) -> usize {
        self.pages.iter().map(|p| p.objects.len()).sum()
    }
}

/// A single page with its native point size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub index: usize,
    pub width_pt: f64,
    pub height_pt: f64,
    #[serde(default)]
    pub objects: Vec<PageObject>,
}

impl Page {
    pub fn size_pt(&self) -> Size {
        Size::new(self.width_pt, self.height_pt)
    }

    /// Find an object by id.
    pub fn object(&self, id: &str) -> Option<&PageObject> {
        self.objects.iter().find(|o| o.id() == id)
    }
}

/// An editable object on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PageObject {
    Text(TextObject),
    Image(GraphicObject),
    Path(GraphicObject),
}

impl PageObject {
    pub fn id(&self) -> &str {
        match self {
            PageObject::Text(t) => &t.id,
            PageObject::Image(g) | PageObject::Path(g) => &g.id,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            PageObject::Text(_) => ObjectKind::Text,
            PageObject::Image(_) => ObjectKind::Image,
            PageObject::Path(_) => ObjectKind::Path,
        }
    }

    /// Document-space matrix: `Tm` for text, `cm` for images and paths.
    pub fn matrix(&self) -> Affine {
        match self {
            PageObject::Text(t) => t.tm,
            PageObject::Image(g) | PageObject::Path(g) => g.cm,
        }
    }

    /// Bounding box in points.
    pub fn bbox(&self) -> Rect {
        match self {
            PageObject::Text(t) => t.bbox,
            PageObject::Image(g) | PageObject::Path(g) => g.bbox,
        }
    }

    pub fn source(&self) -> Option<&SourceRef> {
        match self {
            PageObject::Text(t) => t.source.as_ref(),
            PageObject::Image(g) | PageObject::Path(g) => g.source.as_ref(),
        }
    }
}

/// A run of text positioned by its text matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextObject {
    pub id: String,
    #[serde(rename = "Tm", with = "serde_matrix")]
    pub tm: Affine,
    #[serde(default)]
    pub font: FontDescriptor,
    #[serde(with = "serde_rect")]
    pub bbox: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

/// An image XObject or path placed by a content matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicObject {
    pub id: String,
    #[serde(with = "serde_matrix")]
    pub cm: Affine,
    #[serde(with = "serde_rect")]
    pub bbox: Rect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: f64,
}

/// Back-reference to where the object lives in the file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u16>,
    /// Start and end offsets inside the decoded content stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_range: Option<(u64, u64)>,
}

/// Serde adapter for `[x0, y0, x1, y1]` rectangles.
pub mod serde_rect {
    use kurbo::Rect;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(r: &Rect, serializer: S) -> Result<S::Ok, S::Error> {
        [r.x0, r.y0, r.x1, r.y1].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rect, D::Error> {
        let [x0, y0, x1, y1] = <[f64; 4]>::deserialize(deserializer)?;
        Ok(Rect::new(x0, y0, x1, y1))
    }
}
