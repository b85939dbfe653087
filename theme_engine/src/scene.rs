//! Scene-graph state the binding layer mutates on behalf of scripts.
//!
//! Rendering is not done here; the node only records what a renderer would
//! need (transform, colour, effects, texture) so hosts can inspect or export
//! the resolved tree.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::HostError;
use crate::value::HostTable;

#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ONE: Vec3 = Vec3 {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const CLEAR: Color = Color::rgba(1.0, 1.0, 1.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Accepts `{r, g, b[, a]}` as a sequence or with named fields.
    pub fn from_table(table: &HostTable) -> Result<Self, HostError> {
        let component = |index: &str, name: &str| {
            table
                .get_number(index)
                .or_else(|| table.get_number(name))
                .map(|value| value as f32)
        };
        let (Some(r), Some(g), Some(b)) = (
            component("1", "r"),
            component("2", "g"),
            component("3", "b"),
        ) else {
            return Err(HostError::InvalidValue {
                what: "color",
                value: format!("table with {} entries", table.len()),
            });
        };
        let a = component("4", "a").unwrap_or(1.0);
        Ok(Color::rgba(r, g, b, a))
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Per-edge fractions, used for both cropping and edge fades.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct Edges {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

fn enum_name<'a>(raw: &'a str, prefix: &str) -> &'a str {
    raw.strip_prefix(prefix).unwrap_or(raw)
}

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $what:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Parse `Prefix_Name` or the bare name, case-insensitively.
            pub fn from_name(raw: &str) -> Result<Self, HostError> {
                let name = enum_name(raw, $prefix);
                $(
                    if name.eq_ignore_ascii_case($label) {
                        return Ok($name::$variant);
                    }
                )+
                Err(HostError::InvalidValue {
                    what: $what,
                    value: raw.to_string(),
                })
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }
    };
}

named_enum!(BlendMode, "BlendMode_", "blend mode", {
    Normal => "Normal",
    Add => "Add",
    Multiply => "Multiply",
    Subtract => "Subtract",
    Modulate => "Modulate",
    NoEffect => "NoEffect",
});

named_enum!(CullMode, "CullMode_", "cull mode", {
    None => "None",
    Back => "Back",
    Front => "Front",
});

named_enum!(ZTestMode, "ZTestMode_", "z-test mode", {
    Off => "Off",
    WriteOnPass => "WriteOnPass",
    WriteOnFail => "WriteOnFail",
});

named_enum!(EffectClock, "EffectClock_", "effect clock", {
    Timer => "Timer",
    TimerGlobal => "TimerGlobal",
    Beat => "Beat",
    Music => "Music",
    BeatNoOffset => "BeatNoOffset",
});

named_enum!(HorizAlign, "HorizAlign_", "horizontal alignment", {
    Left => "Left",
    Center => "Center",
    Right => "Right",
});

named_enum!(VertAlign, "VertAlign_", "vertical alignment", {
    Top => "Top",
    Middle => "Middle",
    Bottom => "Bottom",
});

impl HorizAlign {
    pub fn fraction(self) -> f32 {
        match self {
            HorizAlign::Left => 0.0,
            HorizAlign::Center => 0.5,
            HorizAlign::Right => 1.0,
        }
    }
}

impl VertAlign {
    pub fn fraction(self) -> f32 {
        match self {
            VertAlign::Top => 0.0,
            VertAlign::Middle => 0.5,
            VertAlign::Bottom => 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub enum EffectKind {
    #[default]
    None,
    DiffuseBlink,
    DiffuseShift,
    GlowShift,
    Rainbow,
    Wag,
    Bounce,
    Bob,
    Pulse,
    Spin,
    Vibrate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Effect {
    pub kind: EffectKind,
    pub period: f32,
    pub magnitude: Vec3,
    pub clock: EffectClock,
    pub color1: Color,
    pub color2: Color,
}

impl Default for Effect {
    fn default() -> Self {
        Self {
            kind: EffectKind::None,
            period: 1.0,
            magnitude: Vec3::default(),
            clock: EffectClock::Timer,
            color1: Color::WHITE,
            color2: Color::WHITE,
        }
    }
}

impl Effect {
    /// Start an effect with the defaults the effect kind uses when the
    /// script does not override them.
    pub fn start(&mut self, kind: EffectKind) {
        self.kind = kind;
        self.period = 1.0;
        self.magnitude = match kind {
            EffectKind::Wag => Vec3::new(0.0, 0.0, 20.0),
            EffectKind::Bounce | EffectKind::Bob => Vec3::new(0.0, 20.0, 0.0),
            EffectKind::Pulse => Vec3::new(0.5, 1.0, 1.0),
            EffectKind::Spin => Vec3::new(0.0, 0.0, 180.0),
            EffectKind::Vibrate => Vec3::new(10.0, 10.0, 10.0),
            _ => Vec3::default(),
        };
        match kind {
            EffectKind::DiffuseBlink | EffectKind::DiffuseShift => {
                self.color1 = Color::rgba(0.5, 0.5, 0.5, 0.5);
                self.color2 = Color::WHITE;
            }
            EffectKind::GlowShift => {
                self.color1 = Color::rgba(1.0, 1.0, 1.0, 0.2);
                self.color2 = Color::rgba(1.0, 1.0, 1.0, 0.8);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextureInfo {
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Animation frames, from a `NxM` hint in the file name (`1` otherwise).
    pub frames: u32,
}

impl TextureInfo {
    pub fn new(path: impl Into<String>, width: u32, height: u32) -> Self {
        let path = path.into();
        let frames = frame_hint(&path).unwrap_or(1);
        Self {
            path,
            width,
            height,
            frames,
        }
    }

    /// Size of one animation frame, assuming frames are laid out in the
    /// grid named by the file name hint.
    pub fn frame_size(&self) -> (f32, f32) {
        let (columns, rows) = grid_hint(&self.path).unwrap_or((1, 1));
        (
            self.width as f32 / columns.max(1) as f32,
            self.height as f32 / rows.max(1) as f32,
        )
    }
}

static FRAME_GRID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)x(\d+)\b").expect("frame grid pattern"));

fn grid_hint(path: &str) -> Option<(u32, u32)> {
    let file = Path::new(path).file_stem()?.to_str()?;
    let captures = FRAME_GRID.captures_iter(file).last()?;
    let columns = captures.get(1)?.as_str().parse().ok()?;
    let rows = captures.get(2)?.as_str().parse().ok()?;
    Some((columns, rows))
}

fn frame_hint(path: &str) -> Option<u32> {
    grid_hint(path).map(|(columns, rows)| columns.saturating_mul(rows).max(1))
}

/// Resource collaborator that resolves texture paths to pixel dimensions.
pub trait TextureSource {
    fn load(&self, path: &str) -> Result<TextureInfo, HostError>;
}

/// Reads textures from disk relative to a theme root.
#[derive(Debug, Clone)]
pub struct FileTextureSource {
    root: PathBuf,
}

impl FileTextureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

impl TextureSource for FileTextureSource {
    fn load(&self, path: &str) -> Result<TextureInfo, HostError> {
        let full = self.resolve(path);
        let (width, height) =
            image::image_dimensions(&full).map_err(|err| HostError::Texture {
                path: full.display().to_string(),
                reason: err.to_string(),
            })?;
        log::debug!("loaded texture {} ({width}x{height})", full.display());
        Ok(TextureInfo::new(path, width, height))
    }
}

/// In-memory texture table for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryTextureSource {
    textures: RefCell<BTreeMap<String, (u32, u32)>>,
}

impl MemoryTextureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, path: &str, width: u32, height: u32) -> Self {
        self.insert(path, width, height);
        self
    }

    pub fn insert(&self, path: &str, width: u32, height: u32) {
        self.textures
            .borrow_mut()
            .insert(path.to_string(), (width, height));
    }
}

impl TextureSource for MemoryTextureSource {
    fn load(&self, path: &str) -> Result<TextureInfo, HostError> {
        match self.textures.borrow().get(path) {
            Some(&(width, height)) => Ok(TextureInfo::new(path, width, height)),
            None => Err(HostError::Texture {
                path: path.to_string(),
                reason: "not present in texture table".to_string(),
            }),
        }
    }
}

/// Renderer-facing state of one actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneNode {
    pub position: Vec3,
    pub rotation: Vec3,
    pub base_rotation: Vec3,
    pub zoom: Vec3,
    pub base_zoom: Vec3,
    pub width: f32,
    pub height: f32,
    pub skew_x: f32,
    pub skew_y: f32,
    pub crop: Edges,
    pub fade: Edges,
    pub diffuse: Color,
    pub glow: Color,
    pub aux: f32,
    pub halign: f32,
    pub valign: f32,
    pub visible: bool,
    pub hibernate: f32,
    pub draw_order: i32,
    pub blend: BlendMode,
    pub ztest: ZTestMode,
    pub zwrite: bool,
    pub zbias: f32,
    pub cull: CullMode,
    pub shadow_length: f32,
    pub effect: Effect,
    pub texture: Option<TextureInfo>,
    pub state: u32,
    pub animating: bool,
    pub texture_translate: (f32, f32),
    pub texture_wrapping: bool,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            position: Vec3::default(),
            rotation: Vec3::default(),
            base_rotation: Vec3::default(),
            zoom: Vec3::ONE,
            base_zoom: Vec3::ONE,
            width: 0.0,
            height: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            crop: Edges::default(),
            fade: Edges::default(),
            diffuse: Color::WHITE,
            glow: Color::CLEAR,
            aux: 0.0,
            halign: 0.5,
            valign: 0.5,
            visible: true,
            hibernate: 0.0,
            draw_order: 0,
            blend: BlendMode::Normal,
            ztest: ZTestMode::Off,
            zwrite: false,
            zbias: 0.0,
            cull: CullMode::None,
            shadow_length: 0.0,
            effect: Effect::default(),
            texture: None,
            state: 0,
            animating: false,
            texture_translate: (0.0, 0.0),
            texture_wrapping: false,
        }
    }
}

impl SceneNode {
    pub fn zoomed_width(&self) -> f32 {
        self.width * self.zoom.x * self.base_zoom.x
    }

    pub fn zoomed_height(&self) -> f32 {
        self.height * self.zoom.y * self.base_zoom.y
    }

    /// Uniform zoom; stretches x and y, leaves z alone.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom.x = zoom;
        self.zoom.y = zoom;
    }

    /// Scale uniformly so the node's size fits (or covers) the box.
    pub fn scale_to(&mut self, left: f32, top: f32, right: f32, bottom: f32, cover: bool) {
        let box_width = (right - left).abs();
        let box_height = (bottom - top).abs();
        self.position.x = (left + right) / 2.0;
        self.position.y = (top + bottom) / 2.0;
        if self.width <= 0.0 || self.height <= 0.0 {
            return;
        }
        let zoom_x = box_width / self.width;
        let zoom_y = box_height / self.height;
        let zoom = if cover {
            zoom_x.max(zoom_y)
        } else {
            zoom_x.min(zoom_y)
        };
        self.set_zoom(zoom);
    }

    /// Position and size the node to exactly span the box.
    pub fn stretch_to(&mut self, left: f32, top: f32, right: f32, bottom: f32) {
        self.position.x = (left + right) / 2.0;
        self.position.y = (top + bottom) / 2.0;
        let width = right - left;
        let height = bottom - top;
        if self.width > 0.0 && self.height > 0.0 {
            self.zoom.x = width / self.width;
            self.zoom.y = height / self.height;
        } else {
            self.width = width;
            self.height = height;
        }
    }

    pub fn set_texture(&mut self, texture: TextureInfo) {
        let (width, height) = texture.frame_size();
        self.width = width;
        self.height = height;
        self.state = 0;
        self.texture = Some(texture);
    }

    pub fn num_states(&self) -> u32 {
        self.texture.as_ref().map(|info| info.frames).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostValue;

    #[test]
    fn color_accepts_sequence_and_named_fields() {
        let mut seq = HostTable::new();
        seq.insert("1", HostValue::Number(1.0));
        seq.insert("2", HostValue::Number(0.5));
        seq.insert("3", HostValue::Number(0.0));
        assert_eq!(
            Color::from_table(&seq).expect("seq"),
            Color::rgba(1.0, 0.5, 0.0, 1.0)
        );

        let mut named = HostTable::new();
        named.insert("r", HostValue::Number(0.0));
        named.insert("g", HostValue::Number(0.0));
        named.insert("b", HostValue::Number(1.0));
        named.insert("a", HostValue::Number(0.25));
        assert_eq!(
            Color::from_table(&named).expect("named"),
            Color::rgba(0.0, 0.0, 1.0, 0.25)
        );

        assert!(Color::from_table(&HostTable::new()).is_err());
    }

    #[test]
    fn enum_names_accept_prefixed_and_bare_forms() {
        assert_eq!(BlendMode::from_name("BlendMode_Add").expect("prefixed"), BlendMode::Add);
        assert_eq!(BlendMode::from_name("add").expect("bare"), BlendMode::Add);
        assert_eq!(CullMode::from_name("CullMode_Back").expect("cull"), CullMode::Back);
        assert!(ZTestMode::from_name("sideways").is_err());
    }

    #[test]
    fn frame_hints_come_from_file_names() {
        let info = TextureInfo::new("Graphics/explosion 4x2.png", 256, 128);
        assert_eq!(info.frames, 8);
        assert_eq!(info.frame_size(), (64.0, 64.0));
        let plain = TextureInfo::new("Graphics/bg.png", 640, 480);
        assert_eq!(plain.frames, 1);
    }

    #[test]
    fn scale_to_cover_uses_larger_ratio() {
        let mut node = SceneNode {
            width: 100.0,
            height: 50.0,
            ..SceneNode::default()
        };
        node.scale_to(0.0, 0.0, 200.0, 200.0, true);
        assert_eq!(node.zoom.x, 4.0);
        assert_eq!(node.position.x, 100.0);
        node.scale_to(0.0, 0.0, 200.0, 200.0, false);
        assert_eq!(node.zoom.x, 2.0);
    }

    #[test]
    fn memory_textures_report_missing_paths() {
        let source = MemoryTextureSource::new().with("a.png", 32, 16);
        assert_eq!(source.load("a.png").expect("present").width, 32);
        assert!(matches!(
            source.load("b.png"),
            Err(HostError::Texture { .. })
        ));
    }
}
