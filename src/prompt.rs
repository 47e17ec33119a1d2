//! Prompt construction: themes, rarity and the per-request task message
//!
//! Theme choice and the palette accents are derived from the wallet address
//! so the same wallet gets a stable visual signature. The art style and the
//! central shape vary per request.

use serde::{Deserialize, Serialize};

/// Visual theme of a generated NFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Shape,
    Abstract,
    Cyberpunk,
    Nature,
    Space,
}

/// Palette and vocabulary of a theme
#[derive(Debug, Clone, Copy)]
pub struct ThemeConfig {
    pub name: &'static str,
    pub style: &'static str,
    pub colors: &'static [&'static str],
    pub elements: &'static [&'static str],
}

impl Theme {
    /// Every theme, in selection order
    pub const ALL: [Theme; 5] = [
        Theme::Shape,
        Theme::Abstract,
        Theme::Cyberpunk,
        Theme::Nature,
        Theme::Space,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Shape => "shape",
            Theme::Abstract => "abstract",
            Theme::Cyberpunk => "cyberpunk",
            Theme::Nature => "nature",
            Theme::Space => "space",
        }
    }

    pub fn config(self) -> ThemeConfig {
        match self {
            Theme::Shape => ThemeConfig {
                name: "Shape Network",
                style: "geometric-crystalline",
                colors: &["deep teals", "electric blues", "iridescent whites"],
                elements: &[
                    "3D geometric forms",
                    "crystalline surfaces",
                    "network patterns",
                    "data streams",
                ],
            },
            Theme::Abstract => ThemeConfig {
                name: "Abstract Digital",
                style: "fluid-dynamic",
                colors: &["neon greens", "cyber oranges", "digital purples"],
                elements: &["flowing data", "particle systems", "digital waves", "code fragments"],
            },
            Theme::Cyberpunk => ThemeConfig {
                name: "Cyberpunk City",
                style: "neon-urban",
                colors: &["hot pinks", "electric blues", "acid greens"],
                elements: &[
                    "neon grids",
                    "holographic displays",
                    "urban landscapes",
                    "digital rain",
                ],
            },
            Theme::Nature => ThemeConfig {
                name: "Digital Nature",
                style: "organic-tech",
                colors: &["forest greens", "earth browns", "sky blues"],
                elements: &[
                    "fractal trees",
                    "digital flowers",
                    "tech-organic fusion",
                    "glowing seeds",
                ],
            },
            Theme::Space => ThemeConfig {
                name: "Cosmic Digital",
                style: "stellar-abstract",
                colors: &["deep space blues", "stellar whites", "nebula purples"],
                elements: &[
                    "constellation patterns",
                    "cosmic dust",
                    "digital planets",
                    "light streams",
                ],
            },
        }
    }
}

/// Rarity tier; higher tiers ask for more visual complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }

    fn enhancement(self) -> Option<&'static str> {
        match self {
            Rarity::Common => None,
            Rarity::Rare => Some("Add subtle special effects and enhanced lighting for RARE quality."),
            Rarity::Epic => {
                Some("Include additional atmospheric effects and refined details for EPIC rarity.")
            }
            Rarity::Legendary => Some(
                "Add extra visual complexity with particle effects, multiple light sources, and intricate details for LEGENDARY rarity.",
            ),
        }
    }
}

const ART_STYLES: &[&str] = &[
    "photorealistic 3D rendering",
    "low-poly geometric",
    "vaporwave aesthetic",
    "glitch art inspired",
    "minimalist vector",
    "maximalist detailed",
    "holographic display",
    "wireframe overlay",
];

const SHAPES: &[&str] = &[
    "icosahedron",
    "torus knot",
    "dodecahedron",
    "Möbius strip",
    "tesseract projection",
    "hexagonal prism",
    "spiral helix",
    "octahedron cluster",
    "Klein bottle",
    "geodesic sphere",
];

/// 32-bit string hash (`h = h * 31 + unit` over UTF-16 code units, wrapping)
///
/// Must stay bit-compatible with the front end, which uses the same hash to
/// preview the theme a wallet will get.
pub fn js_hash_code(input: &str) -> i32 {
    input
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn index_for(hash: i32, len: usize) -> usize {
    (hash.unsigned_abs() as usize) % len
}

/// Requested theme, or the one derived from the wallet address
pub fn select_theme(requested: Option<Theme>, wallet: &str) -> Theme {
    requested.unwrap_or_else(|| Theme::ALL[index_for(js_hash_code(wallet), Theme::ALL.len())])
}

/// Per-request variation source (art style and central shape)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSeed(pub u64);

impl PromptSeed {
    /// Seed from the random bits of a v7 UUID
    pub fn random() -> Self {
        PromptSeed(uuid::Uuid::now_v7().as_u128() as u64)
    }

    fn pick<'a>(self, items: &[&'a str], salt: u32) -> &'a str {
        let mixed = self.0.rotate_left(salt) ^ u64::from(salt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        items[(mixed % items.len() as u64) as usize]
    }
}

/// Build the task message for one mint request
pub fn build_prompt(theme: Theme, rarity: Rarity, wallet: &str, seed: PromptSeed) -> String {
    let config = theme.config();
    let style = seed.pick(ART_STYLES, 0);
    let shape = seed.pick(SHAPES, 17);

    let wallet_hash = js_hash_code(wallet);
    let primary_color = config.colors[index_for(wallet_hash, config.colors.len())];
    let key_element = config.elements[index_for(wallet_hash >> 8, config.elements.len())];
    let suffix_start = wallet.len().saturating_sub(6);
    let signature = wallet.get(suffix_start..).unwrap_or(wallet);

    let mut prompt = format!(
        "Create a {style} digital illustration with {aesthetic} aesthetics.

VISUAL ELEMENTS:
- Central focus: {shape} representing {theme_name}
- Primary color: {primary_color} with accents from {palette}
- Key element: {key_element}
- Style: {style} with dramatic lighting and depth

COMPOSITION:
- High contrast lighting with volumetric effects
- Generous negative space
- Sharp details with selective blur for depth of field

TECHNICAL REQUIREMENTS:
- Square aspect ratio (1:1)
- High resolution, rich detail that holds up at small sizes
- Unique visual signature based on wallet: {signature}

WORKFLOW:
1. Call generate-image once with a prompt describing the artwork above.
2. Call mint-and-upload once, passing the returned imageUrl, a name, a description and to = {wallet}.
3. Reply with the transaction hash, block number, metadata IPFS hash and FULL_DALLE_URL:<image url>, then stop.
Never call mint-and-upload a second time.",
        aesthetic = config.style,
        theme_name = config.name,
        palette = config.colors.join(", "),
    );

    if let Some(enhancement) = rarity.enhancement() {
        prompt.push_str("\n\nENHANCEMENT: ");
        prompt.push_str(enhancement);
    }
    prompt
}

/// Standing instructions of the minting assistant
pub const ASSISTANT_INSTRUCTIONS: &str = "You are an NFT minting agent with a funded wallet. \
Every request asks for exactly one artwork minted to exactly one wallet.

Tools:
- generate-image: create the artwork and get back its imageUrl.
- mint-and-upload: pin the image and its metadata to IPFS and mint one NFT. Pass the imageUrl from generate-image unchanged.
- check-payment, get-balance, get-nft-balance, get-wallet-address: read-only lookups.
- use-minting-credit: consume a user's credit. Only call it after a successful mint and only when asked to.

Rules:
- One request means one image and one NFT. Call mint-and-upload at most once.
- If mint-and-upload returns MINTING_ALREADY_COMPLETED, the mint has already happened: report it and stop.
- If a tool returns an error, do not retry the mint. Report the error starting with MINTING FAILED.
- If the user has already minted the allowed number of NFTs, say: User has already minted.

Final answer format (never shorten URLs or hashes):
Transaction hash: 0x<64 hex>
Block Number: <number>
Metadata IPFS Hash: <cid>
FULL_DALLE_URL:<complete image url>";
