use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use tempfile::tempdir;
use theme_engine::{HostValue, ManagerConfig, ScriptManager, ThemeError};
use theme_metrics::Metrics;

const METRICS: &str = r#"
[Common]
ScreenWidth=640

[ScreenTest]
Fallback=Common
ScreenX=320
ScreenY=240
GlowOnCommand=diffusealpha,0.25;zoom,2
"#;

const SCRIPT: &str = r#"
local screen = THEME:GetMetricF("ScreenTest", "ScreenWidth")
return Def.ActorFrame{
    Name = "Screen",
    Width = screen,
    InitCommand = function(self) ActorUtil.SetXY(self, "ScreenTest") end,
    OnCommand = function(self) self:playcommandonchildren("On") end,
    Def.Sprite{
        Name = "Glow",
        Texture = "Graphics/glow 4x2.png",
        InitCommand = function(self)
            ActorUtil.LoadAllCommands(self, "ScreenTest")
            self:setstate(7)
        end,
    },
    Def.Sprite{
        Name = "Logo",
        InitCommand = function(self)
            self:Load(ActorUtil.ResolvePath("Graphics/logo"))
            print("logo", self:GetWidth(), self:GetHeight())
        end,
    },
}
"#;

fn write_png(path: &Path, width: u32, height: u32) -> Result<()> {
    fs::create_dir_all(path.parent().context("png has a parent directory")?)?;
    image::RgbaImage::new(width, height)
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn write_theme(root: &Path) -> Result<()> {
    write_png(&root.join("Graphics").join("glow 4x2.png"), 64, 32)?;
    write_png(&root.join("Graphics").join("logo.png"), 200, 100)?;
    fs::write(root.join("metrics.ini"), METRICS)?;
    fs::write(root.join("default.lua"), SCRIPT)?;
    Ok(())
}

#[test]
fn on_disk_theme_builds_the_expected_tree() -> Result<()> {
    let dir = tempdir().context("creating theme directory")?;
    write_theme(dir.path())?;

    let lines = Rc::new(RefCell::new(Vec::new()));
    let captured = lines.clone();
    let metrics = Metrics::load(&dir.path().join("metrics.ini"))?;
    let manager = ScriptManager::builder()
        .config(ManagerConfig {
            theme_root: dir.path().to_path_buf(),
            ..ManagerConfig::default()
        })
        .metrics(Rc::new(metrics))
        .console_sink(Rc::new(move |line: &str| captured.borrow_mut().push(line.to_string())))
        .build()?;

    let root = manager
        .run_file(&dir.path().join("default.lua"))?
        .context("script returns an actor")?;
    manager.play_command(&root, "On", None)?;

    let snapshot = root.borrow().snapshot();
    assert_eq!(snapshot.class, "ActorFrame");
    assert_eq!((snapshot.position.x, snapshot.position.y), (320.0, 240.0));
    assert_eq!(snapshot.options.get("Width"), Some(&HostValue::Number(640.0)));
    let names: Vec<_> = snapshot.children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Glow", "Logo"]);

    let glow = &snapshot.children[0];
    assert_eq!(glow.size, (16.0, 16.0));
    assert_eq!(glow.diffuse[3], 0.25);
    assert_eq!(glow.zoom.x, 2.0);
    assert_eq!(glow.commands, ["Init", "On"]);

    let logo = &snapshot.children[1];
    assert_eq!(logo.size, (200.0, 100.0));
    assert!(logo.texture.as_deref().is_some_and(|path| path.ends_with("logo.png")));
    assert_eq!(*lines.borrow(), ["logo\t200\t100"]);
    Ok(())
}

#[test]
fn missing_textures_fail_loudly_only_when_loaded_explicitly() -> Result<()> {
    let dir = tempdir()?;
    let manager = ScriptManager::new(ManagerConfig {
        theme_root: dir.path().to_path_buf(),
        ..ManagerConfig::default()
    })?;
    let root = manager
        .run("return Def.Sprite{ Texture = 'nope.png' }", "option.lua")?
        .context("actor")?;
    assert!(root.borrow().node().texture.is_none());

    let err = manager
        .run(
            "return Def.Sprite{ InitCommand = function(self) self:Load(ActorUtil.ResolvePath('nope')) end }",
            "explicit.lua",
        )
        .expect_err("unresolvable path");
    assert!(err.to_string().contains("nope"), "{err}");
    Ok(())
}

#[test]
fn run_file_reports_missing_scripts() {
    let manager = ScriptManager::new(ManagerConfig::default()).expect("manager");
    let err = manager
        .run_file(Path::new("/definitely/not/here.lua"))
        .expect_err("missing file");
    assert!(matches!(err, ThemeError::Io { .. }));
}

#[test]
fn managers_share_the_registry_but_not_script_state() -> Result<()> {
    let first = ScriptManager::new(ManagerConfig::default())?;
    let second = ScriptManager::new(ManagerConfig::default())?;
    first.run("shared = 1", "a.lua")?;
    let seen: mlua::Value = second.lua().globals().get("shared")?;
    assert_eq!(seen, mlua::Value::Nil);
    assert!(std::sync::Arc::ptr_eq(first.registry(), second.registry()));
    Ok(())
}
