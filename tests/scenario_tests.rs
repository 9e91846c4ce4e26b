//! End-to-end scenarios
//!
//! One test per documented scenario, each driving the public API the
//! way a host would: parse for structure, preprocess for evaluation,
//! and a project build for multi-file composition.

use std::path::Path;

use oxdef::ast::Node;
use oxdef::project::{FileLoader, ProjectConfig};
use oxdef::{
    parse_str, preprocess_str, BuildError, MemoryFileSystem, PreprocessErrorKind, Project,
    TagCapability, Value,
};

fn kind_of(error: BuildError) -> PreprocessErrorKind {
    match error {
        BuildError::Preprocess(error) => error.kind,
        BuildError::Collected(errors) => errors[0].kind,
        other => panic!("expected preprocess error, got {:?}", other),
    }
}

// 1. Basic block + property.
#[test]
fn basic_block_and_property() {
    let document = parse_str("[Player (name: \"Hero\", health: 100)]", None).unwrap();
    assert_eq!(document.nodes.len(), 1);
    let player = document.blocks().next().unwrap();
    assert_eq!(player.id.as_deref(), Some("Player"));
    assert_eq!(player.properties.get("name"), Some(&Value::string("Hero")));
    assert_eq!(player.properties.get("health"), Some(&Value::number(100.0)));
    assert!(player.children.is_empty());
}

// 2. Reference resolution: forward, sibling, parent.
#[test]
fn forward_sibling_and_parent_references() {
    let document = preprocess_str(
        "[Container (width: 400)\n\
           [Header (size: ($Content.width + 10))]\n\
           [Content (width: ($parent.width - 20))]\n\
         ]",
        None,
    )
    .unwrap();
    let container = document.blocks().next().unwrap();
    let header = container.child_blocks().next().unwrap();
    let content = container.child_blocks().nth(1).unwrap();
    assert_eq!(header.properties.get("size"), Some(&Value::number(390.0)));
    assert_eq!(content.properties.get("width"), Some(&Value::number(380.0)));
}

// 3. Foreach with free-text children.
#[test]
fn foreach_with_free_text_children() {
    let document = preprocess_str(
        "<set items = {1, 2, 3}>\n\
         [Doc\n\
           <foreach (x in items)>\n\
             [Item (value: x)]\n\
             ```text```\n\
           </foreach>\n\
         ]",
        None,
    )
    .unwrap();
    let doc = document.blocks().next().unwrap();
    assert_eq!(doc.children.len(), 6);
    for (index, pair) in doc.children.chunks(2).enumerate() {
        match &pair[0] {
            Node::Block(item) => {
                assert_eq!(item.id.as_deref(), Some("Item"));
                assert_eq!(
                    item.properties.get("value"),
                    Some(&Value::number((index + 1) as f64))
                );
            }
            other => panic!("expected Item block, got {:?}", other),
        }
        match &pair[1] {
            Node::FreeText(text) => assert_eq!(text.value, "text"),
            other => panic!("expected free text, got {:?}", other),
        }
    }
}

// 4. Import with namespace.
#[test]
fn import_with_namespace() {
    let mut fs = MemoryFileSystem::new();
    fs.add_file("/proj/a.ox", "@component(Button) [Button (width: 100)]");
    fs.add_file(
        "/proj/b.ox",
        "<import \"./a.ox\" as ui>\n[App\n  #ui.component(Button) [MyBtn]\n]",
    );
    let mut project = Project::with_fs(ProjectConfig::new("/proj", "b.ox"), fs);
    project.register_capability("component", TagCapability::new());
    let document = project.build().unwrap();

    let app = document.blocks().next().unwrap();
    let my_btn = app.child_blocks().next().unwrap();
    assert_eq!(my_btn.id.as_deref(), Some("MyBtn"));
    assert_eq!(my_btn.properties.get("width"), Some(&Value::number(100.0)));
}

// 5. Inject scope isolation: $parent at the injected root errors.
#[test]
fn inject_scope_isolation() {
    let mut fs = MemoryFileSystem::new();
    fs.add_file("/proj/main.ox", "[Outer (w: 1) <inject \"./child.ox\">]");
    fs.add_file("/proj/child.ox", "[Inner (w: ($parent.w))]");
    let mut project = Project::with_fs(ProjectConfig::new("/proj", "main.ox"), fs);
    let error = project.build().unwrap_err();
    assert_eq!(kind_of(error), PreprocessErrorKind::UnresolvedReference);
}

// 6. Path traversal rejection.
#[test]
fn path_traversal_rejection() {
    let mut fs = MemoryFileSystem::new();
    fs.add_file("/proj/main.ox", "<import \"../../etc/passwd.ox\"> [App]");
    fs.add_file("/etc/passwd.ox", "not even valid ox");
    let mut project = Project::with_fs(ProjectConfig::new("/proj", "main.ox"), fs);
    let error = project.build().unwrap_err();
    assert_eq!(kind_of(error), PreprocessErrorKind::PathTraversal);
}

// 7. LRU eviction.
#[test]
fn lru_eviction() {
    let mut fs = MemoryFileSystem::new();
    for (name, fill) in [("a", "a"), ("b", "b"), ("c", "c")] {
        fs.add_file(
            format!("/proj/{}.ox", name),
            format!("[X (pad: \"{}\")]", fill.repeat(180)),
        );
    }
    let mut config = ProjectConfig::new("/proj", "a.ox");
    config.max_cache_size = 500;
    let mut loader = FileLoader::new(fs, &config);

    loader.load(Path::new("/proj/a.ox")).unwrap();
    loader.load(Path::new("/proj/b.ox")).unwrap();
    loader.load(Path::new("/proj/c.ox")).unwrap();
    assert!(!loader.has(Path::new("/proj/a.ox")));
    assert!(loader.has(Path::new("/proj/b.ox")));
    assert!(loader.has(Path::new("/proj/c.ox")));

    let misses = loader.stats().misses;
    loader.load(Path::new("/proj/a.ox")).unwrap();
    assert_eq!(loader.stats().misses, misses + 1);
    assert!(loader.has(Path::new("/proj/a.ox")));
    assert!(!loader.has(Path::new("/proj/b.ox")));
    assert!(loader.has(Path::new("/proj/c.ox")));
}

// 8. Free-text dedent.
#[test]
fn free_text_dedent() {
    let document = parse_str(
        "[B ```\n    line one\n      line two\n    line three\n```]",
        None,
    )
    .unwrap();
    let block = document.blocks().next().unwrap();
    match &block.children[0] {
        Node::FreeText(text) => {
            assert_eq!(text.value, "line one\n  line two\nline three")
        }
        other => panic!("expected free text, got {:?}", other),
    }
}
