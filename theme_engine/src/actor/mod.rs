//! Actor records: the host side of a script descriptor.

pub mod class;
pub mod frame;
pub mod methods;
pub mod sprite;
pub mod theme;
pub mod util;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::scene::{SceneNode, Vec3};
use crate::value::{HostTable, Opaque};

pub type ActorRef = Rc<RefCell<Actor>>;

/// Descriptor fields after the script table has been read.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    pub class: String,
    pub name: Option<String>,
    /// Command name (suffix stripped) to script function.
    pub commands: BTreeMap<String, Opaque>,
    pub options: HostTable,
}

#[derive(Debug)]
pub struct Actor {
    class: String,
    name: String,
    pub(crate) node: SceneNode,
    commands: BTreeMap<String, Opaque>,
    options: HostTable,
    children: Vec<ActorRef>,
    parent: Weak<RefCell<Actor>>,
    proxy: Option<Opaque>,
    tween_time_left: f32,
}

impl Actor {
    pub fn new(class: &str) -> ActorRef {
        Rc::new(RefCell::new(Actor {
            class: class.to_string(),
            name: String::new(),
            node: SceneNode::default(),
            commands: BTreeMap::new(),
            options: HostTable::new(),
            children: Vec::new(),
            parent: Weak::new(),
            proxy: None,
            tween_time_left: 0.0,
        }))
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn node(&self) -> &SceneNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut SceneNode {
        &mut self.node
    }

    pub fn command(&self, name: &str) -> Option<&Opaque> {
        self.commands.get(name)
    }

    pub fn set_command(&mut self, name: impl Into<String>, command: Opaque) {
        self.commands.insert(name.into(), command);
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn options(&self) -> &HostTable {
        &self.options
    }

    pub fn children(&self) -> &[ActorRef] {
        &self.children
    }

    pub fn child_by_name(&self, name: &str) -> Option<ActorRef> {
        self.children
            .iter()
            .find(|child| child.try_borrow().map(|c| c.name == name).unwrap_or(false))
            .cloned()
    }

    pub fn parent(&self) -> Option<ActorRef> {
        self.parent.upgrade()
    }

    /// The script table standing in for this actor, once wrapped.
    pub fn proxy(&self) -> Option<&Opaque> {
        self.proxy.as_ref()
    }

    pub(crate) fn set_proxy(&mut self, proxy: Opaque) {
        self.proxy = Some(proxy);
    }

    /// Base descriptor step: name, commands and raw options. Capability
    /// specific options are consumed afterwards by the class.
    pub fn load_from_descriptor(&mut self, descriptor: Descriptor) {
        if let Some(name) = descriptor.name {
            self.name = name;
        }
        self.commands.extend(descriptor.commands);
        for (key, value) in descriptor.options.iter() {
            self.options.insert(key, value.clone());
        }
    }

    pub fn attach_child(parent: &ActorRef, child: ActorRef) {
        child.borrow_mut().parent = Rc::downgrade(parent);
        parent.borrow_mut().children.push(child);
    }

    pub fn tween_time_left(&self) -> f32 {
        self.tween_time_left
    }

    /// Tweens collapse: the target state applies at once and only the
    /// remaining duration is tracked.
    pub fn add_tween(&mut self, seconds: f32) {
        self.tween_time_left += seconds.max(0.0);
    }

    pub fn stop_tweening(&mut self) {
        self.tween_time_left = 0.0;
    }

    pub fn hurry_tweening(&mut self, factor: f32) {
        if factor > 0.0 {
            self.tween_time_left /= factor;
        }
    }

    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            class: self.class.clone(),
            name: self.name.clone(),
            position: self.node.position,
            rotation: self.node.rotation,
            zoom: self.node.zoom,
            size: (self.node.width, self.node.height),
            visible: self.node.visible,
            diffuse: self.node.diffuse.to_array(),
            texture: self.node.texture.as_ref().map(|info| info.path.clone()),
            commands: self.commands.keys().cloned().collect(),
            options: self.options.clone(),
            children: self
                .children
                .iter()
                .filter_map(|child| child.try_borrow().ok().map(|child| child.snapshot()))
                .collect(),
        }
    }
}

/// Serialisable view of a resolved actor tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSnapshot {
    pub class: String,
    pub name: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub zoom: Vec3,
    pub size: (f32, f32),
    pub visible: bool,
    pub diffuse: [f32; 4],
    pub texture: Option<String>,
    pub commands: Vec<String>,
    pub options: HostTable,
    pub children: Vec<ActorSnapshot>,
}

impl ActorSnapshot {
    /// Depth-first walk yielding every node with its depth.
    pub fn walk(&self) -> Vec<(usize, &ActorSnapshot)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostValue;

    #[test]
    fn descriptor_step_copies_name_and_options() {
        let actor = Actor::new("Actor");
        let mut options = HostTable::new();
        options.insert("Texture", HostValue::from("bg.png"));
        actor.borrow_mut().load_from_descriptor(Descriptor {
            class: "Actor".to_string(),
            name: Some("bg".to_string()),
            commands: BTreeMap::new(),
            options,
        });
        let actor = actor.borrow();
        assert_eq!(actor.name(), "bg");
        assert_eq!(actor.options().get_str("Texture"), Some("bg.png"));
    }

    #[test]
    fn children_keep_attach_order_and_parent_link() {
        let parent = Actor::new("ActorFrame");
        for name in ["first", "second"] {
            let child = Actor::new("Actor");
            child.borrow_mut().set_name(name);
            Actor::attach_child(&parent, child);
        }
        let names: Vec<String> = parent
            .borrow()
            .children()
            .iter()
            .map(|child| child.borrow().name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        let second = parent.borrow().child_by_name("second").expect("child");
        let back = second.borrow().parent().expect("parent");
        assert!(Rc::ptr_eq(&back, &parent));
    }

    #[test]
    fn tweens_accumulate_and_reset() {
        let actor = Actor::new("Actor");
        let mut actor = actor.borrow_mut();
        actor.add_tween(0.5);
        actor.add_tween(0.25);
        assert_eq!(actor.tween_time_left(), 0.75);
        actor.hurry_tweening(3.0);
        assert_eq!(actor.tween_time_left(), 0.25);
        actor.stop_tweening();
        assert_eq!(actor.tween_time_left(), 0.0);
    }

    #[test]
    fn snapshot_walk_is_depth_first() {
        let root = Actor::new("ActorFrame");
        root.borrow_mut().set_name("root");
        let a = Actor::new("ActorFrame");
        a.borrow_mut().set_name("a");
        let a1 = Actor::new("Actor");
        a1.borrow_mut().set_name("a1");
        Actor::attach_child(&a, a1);
        Actor::attach_child(&root, a);
        let b = Actor::new("Actor");
        b.borrow_mut().set_name("b");
        Actor::attach_child(&root, b);
        let snapshot = root.borrow().snapshot();
        let order: Vec<(usize, &str)> = snapshot
            .walk()
            .into_iter()
            .map(|(depth, node)| (depth, node.name.as_str()))
            .collect();
        assert_eq!(order, vec![(0, "root"), (1, "a"), (2, "a1"), (1, "b")]);
    }
}
