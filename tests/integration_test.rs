use game_engine_js::host::{demo_class_db, ClassDb, ClassDecl, HostObjectSystem};
use game_engine_js::registry::{BindingKind, ClassRegistry, SingletonTable};
use game_engine_js::script::{DebugReply, DebugRequest, ScriptWatcher};
use game_engine_js::{
    CallError, JsLanguage, LanguageConfig, ObjectId, ScriptError, ScriptStatus, Variant,
    VariantType,
};
use glam::Vec2;
use proptest::prelude::*;
use std::rc::Rc;

fn language_with(db: &Rc<ClassDb>, config: LanguageConfig) -> JsLanguage {
    let mut language = JsLanguage::new(db.clone(), config);
    language.init().expect("language init");
    language
}

fn language(db: &Rc<ClassDb>) -> JsLanguage {
    language_with(db, LanguageConfig::default())
}

fn eval(language: &JsLanguage, source: &str) -> Variant {
    language.execute_source("test.js", source).expect(source)
}

// ============================================================================
// 端到端
// ============================================================================

#[test]
fn test_exported_factory_method_returns_argument() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.create_script().unwrap();
    assert_eq!(script.status(), ScriptStatus::Empty);
    script.set_source("exports = function(){ return { methodOne: function(a){ return a; } } }");
    assert_eq!(script.status(), ScriptStatus::Unreloaded);
    script.reload(false).unwrap();
    assert_eq!(script.status(), ScriptStatus::Valid);

    let instance = script.instance_create(owner).unwrap();
    assert_eq!(
        instance.call("methodOne", &[Variant::Int(42)]).unwrap(),
        Variant::Int(42)
    );
    assert!(script.has_method("methodOne"));
    assert!(script.instance_has(owner));
}

#[test]
fn test_undefined_method_is_invalid_method() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.create_script().unwrap();
    script.set_source("exports = function () { this.speed = 5; this.run = function () { throw new Error('tripped'); }; }");
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();

    assert_eq!(
        instance.call("does_not_exist", &[]),
        Err(CallError::InvalidMethod("does_not_exist".into()))
    );
    assert_eq!(
        instance.call("speed", &[]),
        Err(CallError::InvalidMethod("speed".into()))
    );
    // 可选钩子不存在时视为成功
    assert_eq!(instance.call("_process", &[Variant::Real(0.016)]), Ok(Variant::Nil));

    match instance.call("run", &[]) {
        Err(CallError::ScriptException(message)) => assert!(message.contains("tripped")),
        other => panic!("expected a script exception, got {:?}", other),
    }
    // 失败的调用之后引擎仍可用
    assert_eq!(instance.get("speed"), Some(Variant::Int(5)));
}

#[test]
fn test_instance_properties_not_handled_when_missing() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.create_script().unwrap();
    script.set_source("exports = function () { this.hp = 10; this.heal = function (n) { this.hp += n; return this.hp; }; }");
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();

    assert_eq!(instance.get("hp"), Some(Variant::Int(10)));
    assert_eq!(instance.get("mana"), None);
    assert_eq!(instance.get("heal"), None);

    assert!(instance.set("hp", &Variant::Int(1)));
    assert!(!instance.set("mana", &Variant::Int(1)));
    assert_eq!(instance.call("heal", &[Variant::Int(2)]), Ok(Variant::Int(3)));
}

#[test]
fn test_script_class_extends_host_class() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node2D").unwrap();
    db.call(owner, "set_name", &["hero".into()]).unwrap();

    let script = language.create_script().unwrap();
    script.set_source(
        "class Player extends Node {\n\
         constructor() { super(); this.hp = 10; }\n\
         hit(n) { this.hp -= n; return this.hp; }\n\
         }\n\
         Player;",
    );
    script.reload(false).unwrap();
    assert!(script.has_method("hit"));

    let instance = script.instance_create(owner).unwrap();
    assert_eq!(instance.call("hit", &[Variant::Int(3)]), Ok(Variant::Int(7)));
    // 宿主方法沿原型链分派到实例所属的宿主对象
    assert_eq!(instance.call("get_name", &[]), Ok(Variant::from("hero")));
    assert_eq!(
        instance.call("get_instance_id", &[]),
        Ok(Variant::Int(owner.0 as i64))
    );
    assert_eq!(instance.get("hp"), Some(Variant::Int(7)));

    drop(instance);
    language.collect_garbage().unwrap();
    assert_eq!(db.destroy_count(owner), 0);
    assert!(db.is_alive(owner));
}

#[test]
fn test_host_new_inside_script_constructor_builds_new_object() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Sprite").unwrap();
    let live_before = db.live_objects();

    let script = language.create_script().unwrap();
    script.set_source(
        "exports = function () { this.child = new Node(); this.childId = this.child.get_instance_id(); }",
    );
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();

    let child = ObjectId(instance.get("childId").unwrap().as_int().unwrap() as u64);
    assert_ne!(child, owner);
    assert_eq!(db.live_objects(), live_before + 1);
    assert_eq!(instance.get("child"), Some(Variant::Object(child)));

    // 宿主对象的包装器没有被改成 Node 的原型
    language.add_global_constant("owner", &Variant::Object(owner)).unwrap();
    assert_eq!(
        eval(&language, "Object.getPrototypeOf(owner) === Sprite.prototype && owner.get_frame()"),
        Variant::Int(0)
    );
}

#[test]
fn test_host_new_before_super_is_not_adopted() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node2D").unwrap();

    let script = language.create_script().unwrap();
    script.set_source(
        "class Player extends Node {\n\
         constructor() { const helper = new Node(); super(); this.helper = helper; }\n\
         }\n\
         Player;",
    );
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();

    assert_eq!(
        instance.call("get_instance_id", &[]),
        Ok(Variant::Int(owner.0 as i64))
    );
    match instance.get("helper") {
        Some(Variant::Object(helper)) => {
            assert_ne!(helper, owner);
            assert!(db.is_alive(helper));
        }
        other => panic!("expected a helper object, got {:?}", other),
    }
}

#[test]
fn test_template_script_compiles_and_instances() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.template("Mover", "Node").unwrap();
    script.reload(false).unwrap();
    assert!(script.has_method("_ready"));
    let instance = script.instance_create(owner).unwrap();
    assert_eq!(instance.call("_ready", &[]), Ok(Variant::Nil));
}

// ============================================================================
// 类注册
// ============================================================================

#[test]
fn test_root_class_is_renamed() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    assert_eq!(eval(&language, "typeof EngineObject"), Variant::from("function"));
    assert_eq!(eval(&language, "EngineObject.name"), Variant::from("EngineObject"));
    // 脚本引擎自己的 Object 没有被覆盖
    assert_eq!(eval(&language, "Object === ({}).constructor"), Variant::Bool(true));
    assert_eq!(eval(&language, "typeof Object.keys"), Variant::from("function"));
    assert_eq!(
        eval(&language, "new EngineObject().get_class()"),
        Variant::from("Object")
    );
}

#[test]
fn test_every_registered_class_is_constructible_and_instanceof_parent() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    let mut singletons = SingletonTable::new();
    singletons.build(db.as_ref());
    let mut registry = ClassRegistry::new();
    registry.build(db.as_ref(), "EngineObject", &singletons).unwrap();

    let mut checked = 0;
    for (_, binding) in registry.iter() {
        if binding.kind != BindingKind::Class || !binding.instantiable {
            continue;
        }
        let Some(parent) = binding.parent.and_then(|p| registry.get(p)) else {
            continue;
        };
        let source = format!(
            "(() => {{ const o = new {child}(); return o instanceof {child} && o instanceof {parent}; }})()",
            child = binding.script_name,
            parent = parent.script_name
        );
        assert_eq!(eval(&language, &source), Variant::Bool(true), "{}", source);
        checked += 1;
    }
    assert!(checked >= 3);
}

#[test]
fn test_non_instantiable_class_throws_type_error() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    assert_eq!(
        eval(
            &language,
            "(() => { try { new Resource(); return false; } catch (e) { return e instanceof TypeError; } })()"
        ),
        Variant::Bool(true)
    );
    assert_eq!(
        eval(
            &language,
            "(() => { try { Node(); return false; } catch (e) { return e instanceof TypeError; } })()"
        ),
        Variant::Bool(true)
    );
    assert_eq!(
        eval(&language, "(() => { try { new Resource(); } catch (e) { return e.message; } })()"),
        Variant::from("Class 'Resource' cannot be instantiated")
    );
}

#[test]
fn test_singletons_are_plain_objects() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    assert_eq!(eval(&language, "Engine.get_version()"), Variant::from("4.0-js"));
    assert_eq!(eval(&language, "typeof Engine"), Variant::from("object"));
    assert_eq!(eval(&language, "typeof EngineDebugger"), Variant::from("undefined"));
}

#[test]
fn test_argument_errors_are_thrown_to_script() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    let source = "(() => { const n = new Node(); try { n.set_name(); return 'no error'; } catch (e) { return e.name; } })()";
    assert_eq!(eval(&language, source), Variant::from("TypeError"));

    let source = "(() => { const n = new Node(); try { Node.prototype.get_name.call({}); return 'no error'; } catch (e) { return e.name; } })()";
    assert_eq!(eval(&language, source), Variant::from("TypeError"));

    // 引擎在失败调用之后依然可用
    assert_eq!(eval(&language, "1 + 1"), Variant::Int(2));
}

#[test]
fn test_host_properties_and_builtins() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    assert_eq!(
        eval(&language, "(() => { const s = new Sprite(); s.frame = 3; return s.get_frame(); })()"),
        Variant::Int(3)
    );
    assert_eq!(
        eval(
            &language,
            "(() => { const n = new Node2D(); n.translate(new Vector2(1, 2)); n.translate(new Vector2(1, 2)); return n.position.y; })()"
        ),
        Variant::Int(4)
    );
    assert_eq!(
        eval(&language, "new Vector2(1, 2).add(new Vector2(3, 4)).x"),
        Variant::Int(4)
    );
    assert_eq!(
        eval(&language, "new Vector2(1, 2).equals(new Vector2(1, 2))"),
        Variant::Bool(true)
    );
    assert_eq!(
        eval(&language, "new Vector2(1, 2) instanceof Vector2"),
        Variant::Bool(true)
    );
    assert_eq!(
        eval(&language, "new Vector2(3, 4)"),
        Variant::from(Vec2::new(3.0, 4.0))
    );
}

#[test]
fn test_reload_bindings_picks_up_new_classes() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    assert_eq!(eval(&language, "typeof Enemy"), Variant::from("undefined"));

    db.register_class(ClassDecl::new("Enemy").inherits("Node").property("hp", 5));
    language.reload_bindings().unwrap();

    assert_eq!(
        eval(&language, "(() => { const e = new Enemy(); return e instanceof Node && e.hp; })()"),
        Variant::Int(5)
    );
}

#[test]
fn test_reload_bindings_rebases_live_wrappers() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node2D").unwrap();
    let native = db.construct("Sprite").unwrap();

    let script = language.create_script().unwrap();
    script.set_source(
        "class Player extends Node {\n\
         isNode() { return this instanceof Node && this instanceof EngineObject; }\n\
         }\n\
         Player;",
    );
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();

    language.add_global_constant("native", &Variant::Object(native)).unwrap();
    eval(&language, "var held = new Node();");

    db.register_class(ClassDecl::new("Enemy").inherits("Node"));
    language.reload_bindings().unwrap();

    assert_eq!(
        eval(&language, "held instanceof Node && held instanceof EngineObject"),
        Variant::Bool(true)
    );
    assert_eq!(
        eval(&language, "native instanceof Sprite && native instanceof Node2D"),
        Variant::Bool(true)
    );
    assert_eq!(
        eval(&language, "Object.getPrototypeOf(native) === Sprite.prototype"),
        Variant::Bool(true)
    );
    assert_eq!(instance.call("isNode", &[]), Ok(Variant::Bool(true)));
    assert_eq!(
        instance.call("get_instance_id", &[]),
        Ok(Variant::Int(owner.0 as i64))
    );
}

// ============================================================================
// 值转换
// ============================================================================

#[test]
fn test_unregistered_composite_marshals_to_null() {
    let db = Rc::new(demo_class_db());
    let mut config = LanguageConfig::default();
    config.binding.register_builtins = false;
    let language = language_with(&db, config);

    language
        .add_global_constant("v", &Variant::from(Vec2::new(1.0, 2.0)))
        .unwrap();
    assert_eq!(eval(&language, "v === null"), Variant::Bool(true));
}

#[test]
fn test_unregistered_object_marshals_to_null() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let (_, engine) = db
        .singletons()
        .into_iter()
        .find(|(name, _)| name == "Engine")
        .unwrap();

    language
        .add_global_constant("engine", &Variant::Object(engine))
        .unwrap();
    assert_eq!(eval(&language, "engine === null"), Variant::Bool(true));
}

#[test]
fn test_object_identity_round_trip() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let node = db.construct("Node").unwrap();

    language.add_global_constant("a", &Variant::Object(node)).unwrap();
    language.add_global_constant("b", &Variant::Object(node)).unwrap();
    assert_eq!(eval(&language, "a === b"), Variant::Bool(true));
    assert_eq!(eval(&language, "a"), Variant::Object(node));
    assert_eq!(eval(&language, "[a, 1, 'x']"), Variant::Array(vec![
        Variant::Object(node),
        Variant::Int(1),
        Variant::from("x"),
    ]));
    assert_eq!(eval(&language, "({})"), Variant::Nil);
    assert_eq!(eval(&language, "(function () {})"), Variant::Nil);
}

#[test]
fn test_script_owned_identity_round_trip() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    assert_eq!(
        eval(&language, "var a = new Node(); var b = new Node(); b.name = a; b.name === a"),
        Variant::Bool(true)
    );
    assert_eq!(eval(&language, "[b.name][0] === a"), Variant::Bool(true));

    let id = ObjectId(eval(&language, "a.get_instance_id()").as_int().unwrap() as u64);
    assert_eq!(eval(&language, "a = null;"), Variant::Nil);
    language.collect_garbage().unwrap();

    // 缓存不延长包装器寿命，回收后宿主对象被销毁，读回得到 null
    assert_eq!(db.destroy_count(id), 1);
    assert_eq!(eval(&language, "b.name === null"), Variant::Bool(true));
}

#[test]
fn test_number_kinds_follow_engine_tags() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let round_trip = |value: Variant| {
        language.add_global_constant("n", &value).unwrap();
        eval(&language, "n")
    };

    let back = round_trip(Variant::Int(7));
    assert_eq!(back.get_type(), VariantType::Int);
    let back = round_trip(Variant::Real(2.5));
    assert_eq!(back.get_type(), VariantType::Real);

    // 引擎把整数值的双精度数归一成整数标签，超出 i32 的整数只能以双精度数表示
    let back = round_trip(Variant::Real(2.0));
    assert_eq!(back.get_type(), VariantType::Int);
    assert_eq!(back.as_int(), Some(2));
    let back = round_trip(Variant::Int(3_000_000_000));
    assert_eq!(back.get_type(), VariantType::Real);
    assert_eq!(back, Variant::Int(3_000_000_000));
}

fn scalar() -> impl Strategy<Value = Variant> {
    prop_oneof![
        Just(Variant::Nil),
        any::<bool>().prop_map(Variant::Bool),
        any::<i32>().prop_map(|i| Variant::Int(i as i64)),
        (-(1i64 << 53)..(1i64 << 53)).prop_map(Variant::Int),
        (-1.0e12f64..1.0e12f64).prop_map(Variant::Real),
        "\\PC{0,24}".prop_map(Variant::String),
    ]
}

/// 往返后类型标签不变的标量
fn tagged_scalar() -> impl Strategy<Value = Variant> {
    prop_oneof![
        Just(Variant::Nil),
        any::<bool>().prop_map(Variant::Bool),
        any::<i32>().prop_map(|i| Variant::Int(i as i64)),
        (-1.0e12f64..1.0e12f64)
            .prop_filter("integral reals become ints", |r| r.fract() != 0.0)
            .prop_map(Variant::Real),
        "\\PC{0,24}".prop_map(Variant::String),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_scalar_kind_preserved(value in tagged_scalar()) {
        let db = Rc::new(demo_class_db());
        let language = language(&db);
        language.add_global_constant("v", &value).unwrap();
        let back = eval(&language, "v");
        prop_assert_eq!(back.get_type(), value.get_type());
        prop_assert_eq!(back, value);
    }

    #[test]
    fn prop_scalar_round_trip(value in scalar()) {
        let db = Rc::new(demo_class_db());
        let language = language(&db);
        language.add_global_constant("v", &value).unwrap();
        prop_assert_eq!(eval(&language, "v"), value);
    }

    #[test]
    fn prop_scalar_array_round_trip(values in proptest::collection::vec(scalar(), 0..8)) {
        let db = Rc::new(demo_class_db());
        let language = language(&db);
        let value = Variant::Array(values);
        language.add_global_constant("v", &value).unwrap();
        prop_assert_eq!(eval(&language, "v"), value);
    }
}

// ============================================================================
// 所有权
// ============================================================================

#[test]
fn test_script_owned_object_destroyed_exactly_once() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);

    let id = eval(
        &language,
        "var created = new Node(); var createdId = created.get_instance_id(); created = null; createdId",
    );
    let id = ObjectId(id.as_int().unwrap() as u64);
    language.collect_garbage().unwrap();

    assert_eq!(db.destroy_count(id), 1);
    assert!(!db.is_alive(id));

    language.collect_garbage().unwrap();
    assert_eq!(db.destroy_count(id), 1);
}

#[test]
fn test_script_owned_object_destroyed_on_finish() {
    let db = Rc::new(demo_class_db());
    let mut language = language(&db);

    let id = eval(&language, "var kept = new Sprite(); kept.get_instance_id()");
    let id = ObjectId(id.as_int().unwrap() as u64);
    language.collect_garbage().unwrap();
    assert_eq!(db.destroy_count(id), 0);

    language.finish();
    assert_eq!(db.destroy_count(id), 1);
}

#[test]
fn test_native_owned_object_never_destroyed_by_script() {
    let db = Rc::new(demo_class_db());
    let mut language = language(&db);
    let node = db.construct("Node").unwrap();

    language.add_global_constant("owned", &Variant::Object(node)).unwrap();
    eval(&language, "owned.set_name('kept'); owned = null;");
    language.collect_garbage().unwrap();
    assert_eq!(db.destroy_count(node), 0);

    language.finish();
    assert_eq!(db.destroy_count(node), 0);
    assert!(db.is_alive(node));
    assert_eq!(db.call(node, "get_name", &[]).unwrap(), Variant::from("kept"));
}

#[test]
fn test_host_destroyed_object_is_released() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.create_script().unwrap();
    script.set_source("exports = function () { this.ping = function () { return 'pong'; }; }");
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();
    language.add_global_constant("owner", &Variant::Object(owner)).unwrap();

    db.destroy(owner);
    language.object_destroyed(owner).unwrap();

    assert!(!instance.is_live());
    assert_eq!(instance.call("ping", &[]), Err(CallError::InstanceIsNull));
    assert_eq!(script.instance_count(), 0);
    assert_eq!(
        eval(&language, "(() => { try { owner.get_name(); return 'alive'; } catch (e) { return e.name; } })()"),
        Variant::from("ReferenceError")
    );
    drop(instance);
    language.collect_garbage().unwrap();
    assert_eq!(db.destroy_count(owner), 1);
}

// ============================================================================
// 重载
// ============================================================================

#[test]
fn test_reload_with_live_instances_requires_keep_state() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.create_script().unwrap();
    script.set_path("mover.js");
    script.set_source("function Mover() {}\nMover.prototype.speed = function () { return 1; };\nMover;");
    script.reload(false).unwrap();
    let instance = script.instance_create(owner).unwrap();

    // 不论源码是否合法都先因为活实例失败
    for source in ["Mover;", "this is not javascript ((("] {
        script.set_source(source);
        assert!(matches!(
            script.reload(false),
            Err(ScriptError::AlreadyInUse { .. })
        ));
        assert_eq!(script.status(), ScriptStatus::Valid);
    }

    script.set_source("this is not javascript (((");
    assert!(matches!(
        script.reload(true),
        Err(ScriptError::CompilationFailed { .. })
    ));
    assert_eq!(script.status(), ScriptStatus::Invalid);

    script.set_source("function Mover() {}\nMover.prototype.speed = function () { return 2; };\nMover;");
    script.reload(true).unwrap();
    assert_eq!(instance.call("speed", &[]), Ok(Variant::Int(2)));

    drop(instance);
    script.set_source("function Mover() {}\nMover;");
    script.reload(false).unwrap();
    assert!(!script.has_method("speed"));
}

#[test]
fn test_reload_without_instances_depends_only_on_source() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let script = language.create_script().unwrap();

    let cases = [
        ("exports = function () {}", true),
        ("exports = 42", false),
        ("exports = function (", false),
        ("class A { jump() {} }\nA;", true),
        ("class A { jump() {} }\nA;", true),
        ("throw new Error('no')", false),
    ];
    for (source, valid) in cases {
        script.set_source(source);
        assert_eq!(script.reload(false).is_ok(), valid, "{}", source);
        assert_eq!(script.is_valid(), valid);
    }
}

#[test]
fn test_instance_create_requires_valid_script() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();

    let script = language.create_script().unwrap();
    assert!(matches!(
        script.instance_create(owner),
        Err(ScriptError::NotValid { .. })
    ));

    script.set_source("exports = function () {}");
    script.reload(false).unwrap();
    let _first = script.instance_create(owner).unwrap();
    assert!(matches!(
        script.instance_create(owner),
        Err(ScriptError::InstantiationFailed { .. })
    ));
}

#[test]
fn test_signals_and_members_discovered_from_prototype() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let script = language.create_script().unwrap();
    script.set_source(
        "function Door() {}\n\
         Door.prototype.open = function () {};\n\
         Door.prototype.locked = false;\n\
         Door.prototype.signals = ['opened', 'closed'];\n\
         Door;",
    );
    script.reload(false).unwrap();

    assert_eq!(script.method_names(), vec!["open"]);
    assert_eq!(script.member_names(), vec!["locked"]);
    assert!(script.has_script_signal("opened"));
    assert!(script.has_script_signal("closed"));
}

#[test]
fn test_hot_reload_keeps_instances() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let owner = db.construct("Node").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mover.js");

    std::fs::write(&path, "function Mover() {}\nMover.prototype.speed = function () { return 1; };\nMover;").unwrap();
    let script = game_engine_js::script::JsResourceLoader
        .load(&language, &path)
        .unwrap();
    let instance = script.instance_create(owner).unwrap();
    assert_eq!(instance.call("speed", &[]), Ok(Variant::Int(1)));

    let watcher = ScriptWatcher::new(dir.path(), "js").unwrap();
    std::fs::write(&path, "function Mover() {}\nMover.prototype.speed = function () { return 3; };\nMover;").unwrap();
    watcher.notify_changed(&path);

    assert_eq!(language.poll_hot_reload(&watcher), 1);
    assert_eq!(instance.call("speed", &[]), Ok(Variant::Int(3)));
}

// ============================================================================
// 调试
// ============================================================================

#[test]
fn test_debug_requests_from_another_thread() {
    let db = Rc::new(demo_class_db());
    let language = language(&db);
    let handle = language.debug_handle();

    let receivers = std::thread::spawn(move || {
        vec![
            handle
                .submit(DebugRequest::Eval {
                    expression: "[1, 'two', true]".into(),
                })
                .unwrap(),
            handle.submit(DebugRequest::Globals).unwrap(),
            handle
                .submit(DebugRequest::Eval {
                    expression: "missing.value".into(),
                })
                .unwrap(),
            handle.submit(DebugRequest::LastError).unwrap(),
        ]
    })
    .join()
    .unwrap();

    assert_eq!(language.poll_debug_requests(), 4);
    let replies: Vec<DebugReply> = receivers.iter().map(|r| r.recv().unwrap()).collect();

    match &replies[0] {
        DebugReply::Value { value } => assert_eq!(
            value,
            &Variant::Array(vec![Variant::Int(1), Variant::from("two"), Variant::Bool(true)])
        ),
        other => panic!("unexpected reply {:?}", other),
    }
    match &replies[1] {
        DebugReply::Globals { names } => assert!(names.iter().any(|n| n == "Node")),
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(matches!(&replies[2], DebugReply::Error { .. }));
    match &replies[3] {
        DebugReply::LastError { message } => {
            assert!(message.as_deref().unwrap_or_default().contains("ReferenceError"))
        }
        other => panic!("unexpected reply {:?}", other),
    }

    let json = serde_json::to_string(&replies[0]).unwrap();
    assert!(json.starts_with(r#"{"kind":"value""#));
}
