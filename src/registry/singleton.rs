//! 单例表
//!
//! 单例以普通脚本对象的形式公开（不可构造）。表只记录名字到对象的映射；
//! 脚本侧的蹦床在调用时才按名字解析实例，所以宿主替换单例对象后无需重新绑定。

use crate::host::HostObjectSystem;
use crate::variant::ObjectId;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct SingletonTable {
    entries: BTreeMap<String, ObjectId>,
}

impl SingletonTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从宿主重新读取单例列表
    pub fn build(&mut self, host: &dyn HostObjectSystem) {
        self.entries = host.singletons().into_iter().collect();
        tracing::debug!(target: "script.binding", count = self.entries.len(), "Singleton table built");
    }

    pub fn insert(&mut self, name: impl Into<String>, object: ObjectId) {
        self.entries.insert(name.into(), object);
    }

    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.entries.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::demo_class_db;

    #[test]
    fn test_build_and_reset() {
        let db = demo_class_db();
        let mut table = SingletonTable::new();
        table.build(&db);
        assert!(table.contains("Engine"));
        assert_eq!(table.len(), 1);

        table.insert("Input", ObjectId(99));
        assert_eq!(table.get("Input"), Some(ObjectId(99)));

        table.reset();
        assert!(table.is_empty());
    }
}
