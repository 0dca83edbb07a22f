//! 类绑定注册表
//!
//! 宿主类层级被展开成一张按下标寻址的表：父类总是先于子类入表，
//! 每个绑定只记录父类下标，不存在互相引用的树节点。
//! 注册表在语言启动时构建一次，之后只读；只有在独占的重载窗口内才能
//! `reset()` 并整树重建。

pub mod singleton;

pub use singleton::SingletonTable;

use crate::core::error::{BindingError, RegistryResult};
use crate::host::{HostObjectSystem, MethodBind};
use crate::variant::{Composite, Operator, VariantType};
use std::collections::HashMap;

/// 绑定表下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassIndex(pub usize);

/// 绑定种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// 宿主对象类
    Class,
    /// 内置复合值类型
    Builtin(VariantType),
}

/// 方法表项
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub name: String,
    /// 直接调用描述符；宿主没有提供时退回动态调用
    pub bind: Option<MethodBind>,
}

/// 单个类的脚本绑定
#[derive(Debug, Clone)]
pub struct ClassBinding {
    /// 宿主侧类名
    pub name: String,
    /// 脚本侧全局名
    pub script_name: String,
    pub parent: Option<ClassIndex>,
    pub kind: BindingKind,
    pub instantiable: bool,
    pub methods: Vec<MethodEntry>,
    pub properties: Vec<String>,
}

impl ClassBinding {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            script_name: name.clone(),
            name,
            parent: None,
            kind: BindingKind::Class,
            instantiable: true,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|m| m.name.as_str())
    }
}

/// 类绑定注册表
#[derive(Debug, Default)]
pub struct ClassRegistry {
    bindings: Vec<ClassBinding>,
    by_name: HashMap<String, ClassIndex>,
    by_type: HashMap<VariantType, ClassIndex>,
    generation: u64,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从宿主根类开始深度优先遍历，父类先于子类入表
    ///
    /// 与单例同名的类连同其子树一起跳过；根类在脚本侧改名为 `root_alias`。
    pub fn build(
        &mut self,
        host: &dyn HostObjectSystem,
        root_alias: &str,
        singletons: &SingletonTable,
    ) -> RegistryResult<()> {
        let root = host.root_class();
        let mut stack = vec![root.clone()];

        while let Some(class) = stack.pop() {
            if singletons.contains(&class) {
                tracing::debug!(target: "script.binding", class = %class, "Skipping class shadowed by a singleton");
                continue;
            }

            let mut binding = ClassBinding::new(class.clone());
            if class == root || class == "Object" {
                binding.script_name = root_alias.to_string();
            }
            binding.instantiable = host.can_instance(&class);
            binding.methods = host
                .list_methods(&class)
                .into_iter()
                .filter(|m| m.is_scriptable())
                .map(|m| MethodEntry {
                    bind: host.find_method(&class, &m.name),
                    name: m.name,
                })
                .collect();
            binding.properties = host
                .list_properties(&class)
                .into_iter()
                .filter(|p| p.is_scriptable())
                .map(|p| p.name)
                .collect();

            let parent = if class == root {
                None
            } else {
                host.parent_class(&class)
            };
            self.insert(binding, parent.as_deref())?;

            // 逆序压栈，保证按名字顺序出栈
            let mut children = host.list_subclasses(&class);
            children.reverse();
            stack.extend(children);
        }

        tracing::info!(target: "script.binding", classes = self.bindings.len(), "Class registry built");
        Ok(())
    }

    /// 注册一个绑定；同名绑定原位覆盖
    pub fn insert(
        &mut self,
        mut binding: ClassBinding,
        parent: Option<&str>,
    ) -> RegistryResult<ClassIndex> {
        binding.parent = match parent {
            Some(parent) => Some(self.find(parent).ok_or_else(|| {
                BindingError::ParentNotRegistered {
                    class: binding.name.clone(),
                    parent: parent.to_string(),
                }
            })?),
            None => None,
        };

        if let BindingKind::Builtin(ty) = binding.kind {
            if let Some(index) = self.by_type.get(&ty).copied() {
                self.bindings[index.0] = binding;
                return Ok(index);
            }
        }

        if let Some(index) = self.by_name.get(&binding.name).copied() {
            tracing::debug!(target: "script.binding", class = %binding.name, "Overwriting class binding");
            self.bindings[index.0] = binding;
            return Ok(index);
        }

        let index = ClassIndex(self.bindings.len());
        self.by_name.insert(binding.name.clone(), index);
        if let BindingKind::Builtin(ty) = binding.kind {
            self.by_type.insert(ty, index);
        }
        self.bindings.push(binding);
        Ok(index)
    }

    /// 注册内置复合值类型（无父类，附加运算符方法）
    pub fn register_builtins(&mut self) -> RegistryResult<()> {
        for ty in VariantType::COMPOSITES {
            let mut binding = ClassBinding::new(ty.name());
            binding.kind = BindingKind::Builtin(ty);
            binding.methods = Composite::method_names(ty)
                .iter()
                .map(|name| name.to_string())
                .chain(Operator::ALL.iter().map(|op| op.script_name().to_string()))
                .map(|name| MethodEntry { name, bind: None })
                .collect();
            binding.properties = Composite::property_names(ty)
                .iter()
                .map(|name| name.to_string())
                .collect();
            self.insert(binding, None)?;
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<ClassIndex> {
        self.by_name.get(name).copied()
    }

    pub fn builtin(&self, ty: VariantType) -> Option<ClassIndex> {
        self.by_type.get(&ty).copied()
    }

    pub fn get(&self, index: ClassIndex) -> Option<&ClassBinding> {
        self.bindings.get(index.0)
    }

    pub fn binding(&self, name: &str) -> Option<&ClassBinding> {
        self.find(name).and_then(|index| self.get(index))
    }

    /// 方法表项（名字与描述符）
    pub fn method(&self, class: ClassIndex, method: usize) -> Option<&MethodEntry> {
        self.get(class)?.methods.get(method)
    }

    /// 自身及所有祖先，从近到远
    pub fn ancestors(&self, index: ClassIndex) -> impl Iterator<Item = ClassIndex> + '_ {
        std::iter::successors(Some(index), move |current| {
            self.get(*current).and_then(|binding| binding.parent)
        })
    }

    pub fn is_subclass_of(&self, class: ClassIndex, ancestor: ClassIndex) -> bool {
        self.ancestors(class).any(|index| index == ancestor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassIndex, &ClassBinding)> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| (ClassIndex(i), binding))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 每次 `reset` 递增，用来识别过期的脚本侧原型
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reset(&mut self) {
        self.bindings.clear();
        self.by_name.clear();
        self.by_type.clear();
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{demo_class_db, ClassDb, ClassDecl};
    use proptest::prelude::*;

    fn built(db: &ClassDb) -> ClassRegistry {
        let mut singletons = SingletonTable::new();
        singletons.build(db);
        let mut registry = ClassRegistry::new();
        registry.build(db, "EngineObject", &singletons).unwrap();
        registry
    }

    #[test]
    fn test_root_is_renamed() {
        let registry = built(&demo_class_db());
        let root = registry.binding("Object").unwrap();
        assert_eq!(root.script_name, "EngineObject");
        assert!(registry.iter().all(|(_, b)| b.script_name != "Object"));
    }

    #[test]
    fn test_singleton_named_class_and_subtree_skipped() {
        let registry = built(&demo_class_db());
        assert!(registry.find("Engine").is_none());
        assert!(registry.find("EngineDebugger").is_none());
        assert!(registry.find("Sprite").is_some());
    }

    #[test]
    fn test_methods_and_properties_filtered() {
        let registry = built(&demo_class_db());
        let node = registry.binding("Node").unwrap();
        let methods: Vec<_> = node.method_names().collect();
        assert_eq!(methods, vec!["get_name", "set_name"]);
        assert_eq!(node.properties, vec!["name"]);
        assert!(node.methods.iter().all(|m| m.bind.is_some()));

        let node2d = registry.binding("Node2D").unwrap();
        assert_eq!(node2d.properties, vec!["position", "rotation"]);
    }

    #[test]
    fn test_inheritance_edges() {
        let registry = built(&demo_class_db());
        let sprite = registry.find("Sprite").unwrap();
        let node = registry.find("Node").unwrap();
        let resource = registry.find("Resource").unwrap();
        assert!(registry.is_subclass_of(sprite, node));
        assert!(!registry.is_subclass_of(resource, node));

        let chain: Vec<_> = registry
            .ancestors(sprite)
            .map(|i| registry.get(i).unwrap().name.clone())
            .collect();
        assert_eq!(chain, vec!["Sprite", "Node2D", "Node", "Object"]);
    }

    #[test]
    fn test_parent_must_be_registered_first() {
        let mut registry = ClassRegistry::new();
        let err = registry
            .insert(ClassBinding::new("Child"), Some("Missing"))
            .unwrap_err();
        assert_eq!(
            err,
            BindingError::ParentNotRegistered {
                class: "Child".into(),
                parent: "Missing".into()
            }
        );
    }

    #[test]
    fn test_reinsert_overwrites_in_place() {
        let mut registry = ClassRegistry::new();
        let first = registry.insert(ClassBinding::new("Node"), None).unwrap();
        let mut replacement = ClassBinding::new("Node");
        replacement.properties.push("name".into());
        let second = registry.insert(replacement, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first).unwrap().properties, vec!["name"]);
    }

    #[test]
    fn test_builtins_and_reset() {
        let mut registry = ClassRegistry::new();
        registry.register_builtins().unwrap();
        let vec2 = registry.builtin(VariantType::Vector2).unwrap();
        let binding = registry.get(vec2).unwrap();
        assert!(binding.parent.is_none());
        assert!(binding.method_names().any(|m| m == "add"));
        assert!(binding.method_names().any(|m| m == "less"));

        let generation = registry.generation();
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.builtin(VariantType::Vector2).is_none());
        assert_eq!(registry.generation(), generation + 1);
    }

    proptest! {
        #[test]
        fn prop_parent_registered_before_child(parents in proptest::collection::vec(0usize..100, 1..40)) {
            // 第 i 个类的父类是已声明类中的某一个
            let db = ClassDb::new();
            for (i, p) in parents.iter().enumerate() {
                let parent = if i == 0 { "Object".to_string() } else { format!("C{}", p % i) };
                db.register_class(ClassDecl::new(format!("C{}", i)).inherits(parent));
            }
            let registry = built(&db);
            prop_assert_eq!(registry.len(), parents.len() + 1);
            for (index, binding) in registry.iter() {
                if let Some(parent) = binding.parent {
                    prop_assert!(parent < index);
                }
            }
        }
    }
}
