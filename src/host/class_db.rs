//! 进程内类数据库
//!
//! `HostObjectSystem` 的内存实现：类声明、实例存储、单例表。
//! 销毁调用按对象计数，用于检验“脚本自有对象恰好销毁一次，
//! 宿主自有对象从不被脚本侧销毁”。

use super::{HostObjectSystem, MethodBind, MethodFlags, MethodInfo, PropertyInfo};
use crate::core::error::{CallError, CallResult};
use crate::variant::{ObjectId, Variant};
use glam::Vec2;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// 宿主对象实例
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: ObjectId,
    pub class: String,
    pub properties: BTreeMap<String, Variant>,
}

/// 宿主方法实现
pub type NativeMethod = Rc<dyn Fn(&mut Instance, &[Variant]) -> CallResult<Variant>>;

#[derive(Clone)]
struct MethodDecl {
    info: MethodInfo,
    func: Option<NativeMethod>,
}

/// 类声明
#[derive(Clone)]
pub struct ClassDecl {
    name: String,
    parent: Option<String>,
    instantiable: bool,
    methods: Vec<MethodDecl>,
    properties: Vec<(PropertyInfo, Variant)>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            instantiable: true,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn inherits(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// 不能由脚本 `new`
    pub fn not_instantiable(mut self) -> Self {
        self.instantiable = false;
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        arg_count: usize,
        func: impl Fn(&mut Instance, &[Variant]) -> CallResult<Variant> + 'static,
    ) -> Self {
        self.methods.push(MethodDecl {
            info: MethodInfo::new(name, arg_count),
            func: Some(Rc::new(func)),
        });
        self
    }

    /// 只声明，不实现；等待脚本覆盖
    pub fn virtual_method(mut self, name: impl Into<String>, arg_count: usize) -> Self {
        self.methods.push(MethodDecl {
            info: MethodInfo::new(name, arg_count).with_flags(MethodFlags::VIRTUAL),
            func: None,
        });
        self
    }

    pub fn noscript_method(
        mut self,
        name: impl Into<String>,
        arg_count: usize,
        func: impl Fn(&mut Instance, &[Variant]) -> CallResult<Variant> + 'static,
    ) -> Self {
        self.methods.push(MethodDecl {
            info: MethodInfo::new(name, arg_count)
                .with_flags(MethodFlags::NORMAL | MethodFlags::NOSCRIPT),
            func: Some(Rc::new(func)),
        });
        self
    }

    pub fn property(mut self, name: impl Into<String>, default: impl Into<Variant>) -> Self {
        self.properties
            .push((PropertyInfo::new(name), default.into()));
        self
    }

    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.properties.push((PropertyInfo::group(name), Variant::Nil));
        self
    }

    pub fn category(mut self, name: impl Into<String>) -> Self {
        self.properties
            .push((PropertyInfo::category(name), Variant::Nil));
        self
    }
}

#[derive(Default)]
struct Store {
    objects: HashMap<ObjectId, Instance>,
    destroy_calls: HashMap<ObjectId, u32>,
}

/// 内存类数据库
pub struct ClassDb {
    root: String,
    classes: RefCell<BTreeMap<String, ClassDecl>>,
    store: Rc<RefCell<Store>>,
    singletons: RefCell<Vec<(String, ObjectId)>>,
    next_id: Cell<u64>,
}

impl ClassDb {
    /// 只含根类 `Object` 的数据库
    pub fn new() -> Self {
        let root = ClassDecl::new("Object")
            .method("get_class", 0, |inst, _| Ok(Variant::from(inst.class.as_str())))
            .method("get_instance_id", 0, |inst, _| Ok(Variant::Int(inst.id.0 as i64)))
            .virtual_method("_notification", 1);

        let db = Self {
            root: root.name.clone(),
            classes: RefCell::new(BTreeMap::new()),
            store: Rc::new(RefCell::new(Store::default())),
            singletons: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        };
        db.register_class(root);
        db
    }

    /// 运行时注册类；同名类被覆盖
    pub fn register_class(&self, decl: ClassDecl) {
        self.classes.borrow_mut().insert(decl.name.clone(), decl);
    }

    /// 创建单例对象并登记
    pub fn add_singleton(&self, name: impl Into<String>, class: &str) -> Option<ObjectId> {
        let id = self.create_instance(class)?;
        self.singletons.borrow_mut().push((name.into(), id));
        Some(id)
    }

    /// `destroy` 对该对象被调用的次数
    pub fn destroy_count(&self, object: ObjectId) -> u32 {
        self.store
            .borrow()
            .destroy_calls
            .get(&object)
            .copied()
            .unwrap_or(0)
    }

    pub fn live_objects(&self) -> usize {
        self.store.borrow().objects.len()
    }

    pub fn instance(&self, object: ObjectId) -> Option<Instance> {
        self.store.borrow().objects.get(&object).cloned()
    }

    fn create_instance(&self, class: &str) -> Option<ObjectId> {
        let chain = self.chain(class);
        if chain.is_empty() {
            return None;
        }

        let mut properties = BTreeMap::new();
        {
            let classes = self.classes.borrow();
            for name in chain.iter().rev() {
                if let Some(decl) = classes.get(name) {
                    for (info, default) in &decl.properties {
                        if info.is_scriptable() {
                            properties.insert(info.name.clone(), default.clone());
                        }
                    }
                }
            }
        }

        let id = ObjectId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.store.borrow_mut().objects.insert(
            id,
            Instance {
                id,
                class: class.to_string(),
                properties,
            },
        );
        tracing::trace!(target: "script.binding", %id, class, "Host object created");
        Some(id)
    }

    /// 从 `class` 到根类的继承链
    fn chain(&self, class: &str) -> Vec<String> {
        let classes = self.classes.borrow();
        let mut chain = Vec::new();
        let mut current = classes.get(class);
        while let Some(decl) = current {
            if chain.contains(&decl.name) {
                break;
            }
            chain.push(decl.name.clone());
            current = decl.parent.as_ref().and_then(|p| classes.get(p));
        }
        chain
    }

    fn resolve_method(&self, class: &str, method: &str) -> Option<MethodDecl> {
        let classes = self.classes.borrow();
        self.chain(class).iter().find_map(|name| {
            classes
                .get(name)
                .and_then(|decl| decl.methods.iter().find(|m| m.info.name == method))
                .cloned()
        })
    }
}

impl Default for ClassDb {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke_on(
    store: &RefCell<Store>,
    func: &NativeMethod,
    object: ObjectId,
    args: &[Variant],
) -> CallResult<Variant> {
    let mut store = store.borrow_mut();
    let instance = store
        .objects
        .get_mut(&object)
        .ok_or(CallError::InstanceIsNull)?;
    func(instance, args)
}

impl HostObjectSystem for ClassDb {
    fn root_class(&self) -> String {
        self.root.clone()
    }

    fn parent_class(&self, class: &str) -> Option<String> {
        self.classes.borrow().get(class)?.parent.clone()
    }

    fn list_subclasses(&self, class: &str) -> Vec<String> {
        self.classes
            .borrow()
            .values()
            .filter(|decl| decl.parent.as_deref() == Some(class))
            .map(|decl| decl.name.clone())
            .collect()
    }

    fn list_methods(&self, class: &str) -> Vec<MethodInfo> {
        self.classes
            .borrow()
            .get(class)
            .map(|decl| decl.methods.iter().map(|m| m.info.clone()).collect())
            .unwrap_or_default()
    }

    fn list_properties(&self, class: &str) -> Vec<PropertyInfo> {
        self.classes
            .borrow()
            .get(class)
            .map(|decl| decl.properties.iter().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    fn can_instance(&self, class: &str) -> bool {
        self.classes
            .borrow()
            .get(class)
            .map_or(false, |decl| decl.instantiable)
    }

    fn construct(&self, class: &str) -> Option<ObjectId> {
        if !self.can_instance(class) {
            return None;
        }
        self.create_instance(class)
    }

    fn destroy(&self, object: ObjectId) {
        let mut store = self.store.borrow_mut();
        *store.destroy_calls.entry(object).or_insert(0) += 1;
        if store.objects.remove(&object).is_none() {
            tracing::error!(target: "script.binding", %object, "Destroying a host object that is already gone");
        }
    }

    fn is_alive(&self, object: ObjectId) -> bool {
        self.store.borrow().objects.contains_key(&object)
    }

    fn class_of(&self, object: ObjectId) -> Option<String> {
        self.store
            .borrow()
            .objects
            .get(&object)
            .map(|inst| inst.class.clone())
    }

    fn call(&self, object: ObjectId, method: &str, args: &[Variant]) -> CallResult<Variant> {
        let class = self.class_of(object).ok_or(CallError::InstanceIsNull)?;
        let decl = self
            .resolve_method(&class, method)
            .ok_or_else(|| CallError::MethodNotFound {
                class: class.clone(),
                method: method.to_string(),
            })?;
        let func = decl.func.ok_or_else(|| CallError::MethodNotFound {
            class,
            method: method.to_string(),
        })?;
        if args.len() != decl.info.arg_count {
            return Err(CallError::ArgumentCount {
                expected: decl.info.arg_count,
                given: args.len(),
            });
        }
        invoke_on(&self.store, &func, object, args)
    }

    fn find_method(&self, class: &str, method: &str) -> Option<MethodBind> {
        let decl = self.resolve_method(class, method)?;
        let func = decl.func?;
        let store = Rc::clone(&self.store);
        Some(MethodBind::new(
            decl.info.name,
            decl.info.arg_count,
            move |object, args| invoke_on(&store, &func, object, args),
        ))
    }

    fn get_property(&self, object: ObjectId, name: &str) -> Option<Variant> {
        self.store
            .borrow()
            .objects
            .get(&object)?
            .properties
            .get(name)
            .cloned()
    }

    fn set_property(&self, object: ObjectId, name: &str, value: Variant) -> bool {
        let mut store = self.store.borrow_mut();
        match store
            .objects
            .get_mut(&object)
            .and_then(|inst| inst.properties.get_mut(name))
        {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn singletons(&self) -> Vec<(String, ObjectId)> {
        self.singletons.borrow().clone()
    }
}

/// 示例类层级：`Node` / `Node2D` / `Sprite` / `Resource`，以及单例 `Engine`
///
/// 命令行工具和测试共用。
pub fn demo_class_db() -> ClassDb {
    let db = ClassDb::new();

    db.register_class(
        ClassDecl::new("Node")
            .inherits("Object")
            .group("Node")
            .property("name", "")
            .method("get_name", 0, |inst, _| {
                Ok(inst.properties.get("name").cloned().unwrap_or_default())
            })
            .method("set_name", 1, |inst, args| {
                let name = crate::variant_arg!(args, 0, String)?;
                inst.properties.insert("name".into(), name.into());
                Ok(Variant::Nil)
            })
            .virtual_method("_ready", 0)
            .virtual_method("_process", 1),
    );

    db.register_class(
        ClassDecl::new("Node2D")
            .inherits("Node")
            .category("Transform")
            .property("position", Vec2::ZERO)
            .property("rotation", 0.0)
            .method("translate", 1, |inst, args| {
                let offset = match args.first() {
                    Some(Variant::Composite(crate::variant::Composite::Vector2(v))) => *v,
                    Some(other) => {
                        return Err(CallError::InvalidArgument {
                            index: 0,
                            expected: crate::VariantType::Vector2,
                            found: other.get_type(),
                        })
                    }
                    None => Vec2::ZERO,
                };
                let current = match inst.properties.get("position") {
                    Some(Variant::Composite(crate::variant::Composite::Vector2(v))) => *v,
                    _ => Vec2::ZERO,
                };
                inst.properties
                    .insert("position".into(), (current + offset).into());
                Ok(Variant::Nil)
            }),
    );

    db.register_class(
        ClassDecl::new("Sprite")
            .inherits("Node2D")
            .property("frame", 0)
            .method("get_frame", 0, |inst, _| {
                Ok(inst.properties.get("frame").cloned().unwrap_or_default())
            }),
    );

    db.register_class(
        ClassDecl::new("Resource")
            .inherits("Object")
            .not_instantiable()
            .property("resource_path", ""),
    );

    db.register_class(
        ClassDecl::new("Engine")
            .inherits("Object")
            .not_instantiable()
            .property("frames_drawn", 0)
            .method("get_version", 0, |_, _| Ok(Variant::from("4.0-js")))
            .method("get_frames_drawn", 0, |inst, _| {
                Ok(inst.properties.get("frames_drawn").cloned().unwrap_or_default())
            }),
    );

    db.register_class(ClassDecl::new("EngineDebugger").inherits("Engine"));

    // 单例对象直接由宿主创建，绕过 can_instance 检查
    if db.add_singleton("Engine", "Engine").is_none() {
        tracing::error!(target: "script.binding", "Failed to create the Engine singleton");
    }

    db
}
