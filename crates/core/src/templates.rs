//! Instruction templates for each generation mode.
//!
//! A [`PromptTemplate`] bundles the instruction sent alongside the image, the
//! generation budget, and a cleanup rule that strips labels providers tend to
//! prepend ("/imagine", "Stable Diffusion prompt:") despite being told not to.

use crate::error::{AppError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// The output style requested from the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Midjourney,
    StableDiffusion,
    #[default]
    NaturalLanguage,
    Cinematographer,
    Description,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 5] = [
        Self::Midjourney,
        Self::StableDiffusion,
        Self::NaturalLanguage,
        Self::Cinematographer,
        Self::Description,
    ];

    /// Stable identifier, used in settings, messages and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Self::Midjourney => "midjourney",
            Self::StableDiffusion => "stablediffusion",
            Self::NaturalLanguage => "naturallanguage",
            Self::Cinematographer => "cinematographer",
            Self::Description => "description",
        }
    }

    /// Human-readable name for menus.
    pub fn label(self) -> &'static str {
        match self {
            Self::Midjourney => "Midjourney",
            Self::StableDiffusion => "Stable Diffusion",
            Self::NaturalLanguage => "Natural Language",
            Self::Cinematographer => "Cinematographer Analysis",
            Self::Description => "Plain Description",
        }
    }

    pub fn template(self) -> &'static PromptTemplate {
        PromptTemplateCatalog::get(self)
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for GenerationMode {
    type Err = AppError;

    /// Accepts ids and UI labels, ignoring case, spaces, dashes and underscores.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = normalize(s);
        Self::ALL
            .into_iter()
            .find(|mode| mode.id() == wanted || normalize(mode.label()) == wanted)
            .ok_or_else(|| AppError::UnsupportedMode(s.to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Everything a provider call needs to know about one mode.
pub struct PromptTemplate {
    pub mode: GenerationMode,
    pub instruction: &'static str,
    pub max_output_units: u32,
    pub temperature: f32,
    cleanup: Option<&'static LazyLock<Regex>>,
}

impl PromptTemplate {
    /// Trims the provider's answer and strips a known leading label.
    pub fn clean(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self.cleanup {
            Some(pattern) => pattern.replace(trimmed, "").trim().to_string(),
            None => trimmed.to_string(),
        }
    }
}

static MIDJOURNEY_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(/imagine|optimized midjourney prompt|midjourney prompt)(\s+prompt:)?:?\s*")
        .expect("midjourney cleanup pattern compiles")
});

static STABLE_DIFFUSION_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*stable diffusion prompt:\s*")
        .expect("stable diffusion cleanup pattern compiles")
});

static NATURAL_LANGUAGE_PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(natural language prompt|flux prompt):\s*")
        .expect("natural language cleanup pattern compiles")
});

const MIDJOURNEY_INSTRUCTION: &str = r#"You are an expert Midjourney prompt engineer.
Study the attached image closely: its subject, composition, setting and any recognisable artistic style. Write one optimised Midjourney prompt that would recreate it.
The prompt must:
1. Stay faithful to what is actually in the image. Describe the main subjects, objects and scene; do not invent details that are not present or clearly implied.
2. Capture the visual details that matter:
   a. Mood and emotion: expressions of any people and the overall atmosphere (serene, tense, playful, melancholic, ...).
   b. Colour and lighting: the dominant palette, any colour grading (warm vintage, cool teal, neon, desaturated, high-contrast monochrome) and the light itself (soft daylight, golden hour, hard studio light, chiaroscuro).
   c. Camera and shot: the apparent camera or medium and framing (vintage film, crisp DSLR, phone snapshot, macro, wide-angle, drone view). Leave this out for clearly illustrated or abstract images.
   d. Style: name the style explicitly (photorealistic, anime, oil painting, flat illustration, 3D render, ...).
3. Use Midjourney quality keywords only where they reinforce what the image shows; prefer accuracy over heavy stylisation.
4. Add an --ar parameter only when the image's shape clearly suggests one (e.g. --ar 16:9, --ar 2:3). Never add a version parameter.
Output ONLY the prompt text. No preamble, no "/imagine", no explanations."#;

const STABLE_DIFFUSION_INSTRUCTION: &str = r#"You are an expert Stable Diffusion prompt engineer.
Study the attached image closely and write a detailed positive prompt for Stable Diffusion (SDXL or SD 1.5) that would recreate it.
The prompt must:
1. Faithfully describe the key subjects, objects, setting and composition. Do not add elements that are not in the image.
2. Be rich in descriptive tags covering:
   a. Mood and emotion ("contemplative expression", "joyful atmosphere").
   b. Palette, grading and lighting ("muted earth tones", "volumetric light", "rim lighting", "overcast noon").
   c. Shot and lens details when discernible ("extreme close-up", "low-angle shot", "shallow depth of field, bokeh", "85mm lens", "film grain").
   d. Artistic style or medium ("photorealistic", "digital painting", "ink drawing", "pixel art", "cyberpunk concept art").
3. Include quality tags (masterpiece, best quality, highly detailed, sharp focus) only where they suit the image.
4. Be written as comma-separated tags and short phrases. Weight the most important elements with parentheses, e.g. (red umbrella:1.3) or ((main subject)).
5. Mention orientation descriptively if the image is clearly not square ("wide landscape format", "portrait orientation").
Output ONLY the positive prompt. No negative prompt, no labels, no explanations."#;

const NATURAL_LANGUAGE_INSTRUCTION: &str = r#"You are an expert prompt writer for image models that understand natural language (DALL-E, Imagen, Flux and similar).
Study the attached image closely and write a clear, coherent prompt that would let such a model reproduce it with high fidelity.
The prompt must:
1. Accurately describe the main subjects, objects, setting and any action, without inventing anything.
2. Read as fluent, descriptive prose that conveys:
   a. Mood and emotion ("a portrait full of quiet joy", "a tranquil, misty morning").
   b. Colour and light ("bathed in warm early-morning light", "high-contrast noir lighting", "a palette of saturated tropical colours").
   c. Viewpoint and photographic style ("an intimate eye-level shot", "a sweeping aerial view", "candid documentary style", "macro detail"). Default to a clear, high-quality photograph unless the image is illustrative.
   d. Artistic style when one is evident ("impressionist oil painting", "minimalist vector illustration", "vintage sci-fi cover art").
3. Favour a well-composed description over keyword lists.
4. Describe the framing in words if the aspect ratio is distinctive ("a panoramic vista", "a tall, narrow portrait").
Output ONLY the prompt text, without labels or commentary."#;

const CINEMATOGRAPHER_INSTRUCTION: &str = r#"You are a veteran cinematographer and film analyst with decades of experience on set and in the grading suite.
Examine the attached image as a single film frame and give a thorough technical and artistic breakdown. Phrase inferences as an expert would ("appears to be", "likely", "suggests").
Structure the analysis with these Markdown headings:

**Shot Achievement & Style:**
The overall visual style (noir, high-key commercial, gritty documentary, magical realism, ...), the era its visual language evokes, and how the shot was most likely achieved (dolly, handheld, locked-off tripod, long exposure, drone).

**Lighting Analysis:**
- **Setup:** a plausible lighting plan (three-point, single large soft source, window light with bounce, practicals).
- **Quality & Temperature:** hard or soft, and likely colour temperature (e.g. 3200K tungsten, 5600K daylight, mixed with neon practicals).
- **Power:** a conceptual sense of the fixtures involved (low-wattage practicals, large HMI standing in for the sun).

**Camera & Lens Analysis:**
- **Sensor:** the format suggested by depth of field, grain and rendering (full frame, Super 35, Micro Four Thirds, 1-inch camcorder).
- **Lens:** likely focal length and type (24mm wide, 85mm portrait prime, macro, long telephoto compression).

**Composition & Mood:**
Framing, subject placement, leading lines, and the emotional tone the frame conveys.

**Budget Estimation:**
A rough range to professionally recreate this one shot, with a category (Micro-budget/Indie ~$0-5k, Professional commercial ~$10k-50k, High-end cinema $100k+) and a brief justification.

Return the full formatted analysis, not a one-line prompt."#;

const DESCRIPTION_INSTRUCTION: &str =
    "Describe the content of this image in detail. Be precise and informative.";

static CATALOG: [PromptTemplate; 5] = [
    PromptTemplate {
        mode: GenerationMode::Midjourney,
        instruction: MIDJOURNEY_INSTRUCTION,
        max_output_units: 250,
        temperature: 0.5,
        cleanup: Some(&MIDJOURNEY_PREAMBLE),
    },
    PromptTemplate {
        mode: GenerationMode::StableDiffusion,
        instruction: STABLE_DIFFUSION_INSTRUCTION,
        max_output_units: 300,
        temperature: 0.5,
        cleanup: Some(&STABLE_DIFFUSION_PREAMBLE),
    },
    PromptTemplate {
        mode: GenerationMode::NaturalLanguage,
        instruction: NATURAL_LANGUAGE_INSTRUCTION,
        max_output_units: 300,
        temperature: 0.5,
        cleanup: Some(&NATURAL_LANGUAGE_PREAMBLE),
    },
    PromptTemplate {
        mode: GenerationMode::Cinematographer,
        instruction: CINEMATOGRAPHER_INSTRUCTION,
        max_output_units: 700,
        temperature: 0.6,
        cleanup: None,
    },
    PromptTemplate {
        mode: GenerationMode::Description,
        instruction: DESCRIPTION_INSTRUCTION,
        max_output_units: 350,
        temperature: 0.5,
        cleanup: None,
    },
];

/// Lookup of [`PromptTemplate`]s by mode.
pub struct PromptTemplateCatalog;

impl PromptTemplateCatalog {
    pub fn get(mode: GenerationMode) -> &'static PromptTemplate {
        match mode {
            GenerationMode::Midjourney => &CATALOG[0],
            GenerationMode::StableDiffusion => &CATALOG[1],
            GenerationMode::NaturalLanguage => &CATALOG[2],
            GenerationMode::Cinematographer => &CATALOG[3],
            GenerationMode::Description => &CATALOG[4],
        }
    }

    pub fn all() -> &'static [PromptTemplate] {
        &CATALOG
    }
}
