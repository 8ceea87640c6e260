//! Built-in variant descriptor registry.
//!
//! Variant fan-out refines one completed base image with a list of
//! alternative instructions. The registry is versioned so new groups can be
//! added without disturbing records written under an older set.

/// Registry version recorded alongside persisted variants.
pub const REGISTRY_VERSION: &str = "v1";

/// One refinement instruction within a variant group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantDescriptor {
    /// Label unique within the group; becomes the job label.
    pub label: &'static str,
    /// Instruction text sent as the refinement prompt.
    pub description: &'static str,
}

/// Lighting treatments for a product shot.
const LIGHTING: &[VariantDescriptor] = &[
    VariantDescriptor {
        label: "softbox_even",
        description: "Large softbox, minimal shadows, gentle wrap, even illumination",
    },
    VariantDescriptor {
        label: "strong_directional",
        description:
            "Strong directional light from behind or side, crisp shadows, dramatic rim highlights",
    },
    VariantDescriptor {
        label: "backlit_glow",
        description:
            "Light source behind product, glowing edges, caustics/refractions for glass/liquid.",
    },
    VariantDescriptor {
        label: "low_angle_sunset",
        description: "Low-angle, warm color temperature, long soft shadows, sunset vibe",
    },
    VariantDescriptor {
        label: "blue_window",
        description: "Blue-toned, shadowless, natural window light, neutral/cool palette",
    },
];

/// Look up a variant group by its label.
pub fn variant_group(group: &str) -> Option<&'static [VariantDescriptor]> {
    match group {
        "lighting" => Some(LIGHTING),
        _ => None,
    }
}

/// Labels of all known variant groups.
pub fn group_labels() -> &'static [&'static str] {
    &["lighting"]
}
