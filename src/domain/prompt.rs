// Prompt planning for the image-to-image provider. Static templates: either a
// named style preset or free-text instructions folded into the standard
// layout-preserving prefix.

const POSITIVE_PREFIX: &str =
    "keep room layout and camera angle. photorealistic lighting and shadows. ";

const NEGATIVE_BASE: &str = "low quality, blurry, text, watermark, people, extra windows, \
     duplicated walls, distorted furniture";

const DEFAULT_INSTRUCTIONS: &str =
    "refined, tasteful style with clean lines and natural materials";

#[derive(Clone, Debug, PartialEq)]
pub struct PromptPlan {
    pub positive: String,
    pub negative: String,
    pub image_strength: f32,
    pub steps: u32,
    pub cfg_scale: f32,
}

// Plan built from free-text instructions. Blank input falls back to a neutral
// default rather than an empty prompt.
pub fn plan_from_instructions(text: &str) -> PromptPlan {
    let trimmed = text.trim();
    let body = if trimmed.is_empty() {
        DEFAULT_INSTRUCTIONS
    } else {
        trimmed
    };

    PromptPlan {
        positive: format!("{POSITIVE_PREFIX}{body}"),
        negative: format!("{NEGATIVE_BASE}, warped geometry"),
        image_strength: 0.55,
        steps: 28,
        cfg_scale: 7.0,
    }
}

// Plan built from a named style preset. Unknown styles default to minimal.
pub fn plan_from_style(style: &str) -> PromptPlan {
    let base = match style.trim().to_lowercase().as_str() {
        "cozy" => "warm lighting, soft textures, layered textiles, plants, inviting atmosphere",
        "industrial" => "exposed brick, concrete, metal accents, matte black fixtures",
        "luxury" => "marble surfaces, brass details, velvet upholstery, statement lighting",
        _ => "clean lines, neutral palette, scandinavian furniture, lots of natural light",
    };

    PromptPlan {
        positive: format!("{POSITIVE_PREFIX}{base}"),
        negative: NEGATIVE_BASE.to_string(),
        image_strength: 0.6,
        steps: 28,
        cfg_scale: 7.0,
    }
}

// Instructions win over the preset when both are present.
pub fn build_plan(style: &str, instructions: &str) -> PromptPlan {
    if instructions.trim().is_empty() {
        plan_from_style(style)
    } else {
        plan_from_instructions(instructions)
    }
}
