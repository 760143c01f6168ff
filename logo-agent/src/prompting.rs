//! Generation spec derivation and prompt building.
//!
//! Both steps are pure functions of the accepted request, which is what makes
//! the request fingerprint deterministic.

use serde::Serialize;

use crate::request::LogoRequest;

/// Style tags used when the request names none.
pub const DEFAULT_VIBE: [&str; 3] = ["minimal", "geometric", "modern"];

/// Constraints used when the request names none.
pub const DEFAULT_AVOID: [&str; 7] = [
    "photorealism",
    "gradients",
    "tiny details",
    "busy background",
    "text",
    "letters",
    "watermarks",
];

/// Per-candidate emphasis appended to the shared base prompt.
pub const VARIANT_EMPHASES: [&str; 3] = [
    "Emphasize simplicity and symmetry.",
    "Emphasize negative space and a clever geometric twist.",
    "Emphasize a bold mark with a friendly feel (still minimal).",
];

/// What is delivered to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deliverable {
    /// Deliverable kind.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Background treatment.
    pub background: &'static str,
}

/// Normalized form of a [`LogoRequest`] with defaults substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSpec {
    /// Brand name.
    pub brand: String,
    /// Industry, empty when not supplied.
    pub industry: String,
    /// Style tags.
    pub vibe: Vec<String>,
    /// Palette restrictions, possibly empty.
    pub colors: Vec<String>,
    /// Symbols to explore, possibly empty.
    pub icon_ideas: Vec<String>,
    /// Design constraints.
    pub avoid: Vec<String>,
    /// Deliverable description.
    pub deliverable: Deliverable,
}

fn or_default(list: Option<&Vec<String>>, default: &[&str]) -> Vec<String> {
    match list {
        Some(items) if !items.is_empty() => items.clone(),
        _ => default.iter().map(|s| (*s).to_owned()).collect(),
    }
}

impl GenerationSpec {
    /// Derives the spec for a request. Empty lists count as omitted.
    #[must_use]
    pub fn from_request(request: &LogoRequest) -> Self {
        Self {
            brand: request.brand.clone(),
            industry: request.industry.clone().unwrap_or_default(),
            vibe: or_default(request.vibe.as_ref(), &DEFAULT_VIBE),
            colors: or_default(request.colors.as_ref(), &[]),
            icon_ideas: or_default(request.icon_ideas.as_ref(), &[]),
            avoid: or_default(request.avoid.as_ref(), &DEFAULT_AVOID),
            deliverable: Deliverable {
                kind: "icon-only",
                background: "transparent",
            },
        }
    }
}

/// Builds one prompt per candidate: a shared base plus a stylistic emphasis.
#[must_use]
pub fn build_prompts(spec: &GenerationSpec) -> Vec<String> {
    let base = base_prompt(spec);
    VARIANT_EMPHASES
        .iter()
        .map(|emphasis| format!("{base} {emphasis}"))
        .collect()
}

fn base_prompt(spec: &GenerationSpec) -> String {
    let industry = if spec.industry.is_empty() {
        String::new()
    } else {
        format!(" in the {} space", spec.industry)
    };
    let palette = if spec.colors.is_empty() {
        "Use a simple, professional 2–3 color palette.".to_owned()
    } else {
        format!("Color palette limited to: {}.", spec.colors.join(", "))
    };
    let icons = if spec.icon_ideas.is_empty() {
        "Use a strong, simple geometric symbol with a clear silhouette.".to_owned()
    } else {
        format!("Icon ideas to explore: {}.", spec.icon_ideas.join(", "))
    };
    [
        format!(
            "Design a minimalist flat vector-style logo ICON for the brand \"{}\"{industry}.",
            spec.brand
        ),
        format!("Vibe: {}.", spec.vibe.join(", ")),
        palette,
        icons,
        format!("Constraints: {}.", spec.avoid.join(", ")),
        "No text, no letters, no watermark, no mockups.".to_owned(),
        "Centered composition, clean shapes, high contrast. Solid fills. Logo should work at small sizes."
            .to_owned(),
        "Output should be suitable as a transparent-background PNG icon.".to_owned(),
    ]
    .join(" ")
}
