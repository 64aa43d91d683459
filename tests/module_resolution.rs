//! End-to-end module resolution through the engine loader.

use quickjs_sandbox_rs::prelude::*;
use serde_json::json;

fn run(sandbox: &JsSandbox, code: &str) -> EvaluationResult {
    sandbox.evaluate(code, EvalOptions::from_millis(5_000)).unwrap()
}

#[test]
fn test_injected_module_resolves() {
    let config = RuntimeConfig::builder()
        .node_module(
            "custom-module",
            FileTree::dir().with("index.js", "export default 'hi'"),
        )
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(
        &sandbox,
        "import greeting from 'custom-module'\nexport default greeting",
    );
    assert_eq!(result.to_json(), json!({ "ok": true, "data": "hi" }));
}

#[test]
fn test_injected_module_shadows_builtin() {
    let config = RuntimeConfig::builder()
        .node_module(
            "path",
            FileTree::dir().with("index.js", "export const join = () => 'shadowed'"),
        )
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    for specifier in ["path", "node:path"] {
        let result = run(
            &sandbox,
            &format!("import {{ join }} from '{specifier}'\nexport default join('a', 'b')"),
        );
        assert_eq!(result.data(), Some(&json!("shadowed")), "{specifier}");
    }
}

#[test]
fn test_relative_import_via_mount() {
    let config = RuntimeConfig::builder()
        .mount(
            "src",
            FileTree::dir().with(
                "custom.js",
                "export const double = (n) => n * 2\nexport const label = 'custom'",
            ),
        )
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(
        &sandbox,
        "import { double, label } from './custom.js'\nexport default { value: double(21), label }",
    );
    assert_eq!(result.data(), Some(&json!({ "value": 42, "label": "custom" })));
}

#[test]
fn test_nested_relative_imports_resolve_against_importer() {
    let config = RuntimeConfig::builder()
        .mount(
            "src",
            FileTree::dir()
                .with("lib/math.js", "import { one } from '../consts.js'\nexport const two = one + one")
                .with("consts.js", "export const one = 1"),
        )
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(&sandbox, "import { two } from './lib/math.js'\nexport default two");
    assert_eq!(result.data(), Some(&json!(2)));
}

#[test]
fn test_package_internal_imports() {
    let config = RuntimeConfig::builder()
        .node_module(
            "pkg",
            FileTree::dir()
                .with("index.js", "export { value } from './lib/value.js'")
                .with("lib/value.js", "export const value = 'from pkg'"),
        )
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(&sandbox, "import { value } from 'pkg'\nexport default value");
    assert_eq!(result.data(), Some(&json!("from pkg")));

    let result = run(&sandbox, "import { value } from 'pkg/lib/value.js'\nexport default value");
    assert_eq!(result.data(), Some(&json!("from pkg")));
}

#[test]
fn test_missing_module_reports_specifier() {
    let sandbox = JsSandbox::new(RuntimeConfig::default()).unwrap();

    let result = run(&sandbox, "import x from 'left-pad'\nexport default x");
    let err = result.error().unwrap();
    assert_eq!(err.kind, FaultKind::ModuleNotFound);
    assert_eq!(err.message, "Module 'left-pad' not installed or available");
}

#[test]
fn test_missing_transitive_import_is_module_not_found() {
    let config = RuntimeConfig::builder()
        .node_module(
            "broken",
            FileTree::dir().with("index.js", "export { x } from 'does-not-exist'"),
        )
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(&sandbox, "import { x } from 'broken'\nexport default x");
    assert_eq!(result.kind(), Some(FaultKind::ModuleNotFound));
    assert!(result.error().unwrap().message.contains("does-not-exist"));
}

#[test]
fn test_directory_is_not_a_module() {
    let config = RuntimeConfig::builder()
        .mount("src", FileTree::dir().with("lib/a.js", "export default 1"))
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(&sandbox, "import a from './lib'\nexport default a");
    assert_eq!(result.kind(), Some(FaultKind::ModuleNotFound));
}

#[test]
fn test_dynamic_import_miss_can_be_caught() {
    let sandbox = JsSandbox::new(RuntimeConfig::default()).unwrap();

    let result = run(
        &sandbox,
        r#"
        let caught = false
        try { await import('nope') } catch (e) { caught = true }
        export default caught
        "#,
    );
    assert_eq!(result.data(), Some(&json!(true)));
}

#[test]
fn test_syntax_error_in_imported_module_is_exception() {
    let config = RuntimeConfig::builder()
        .node_module("bad", FileTree::dir().with("index.js", "export default ("))
        .build();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(&sandbox, "import bad from 'bad'\nexport default bad");
    assert_eq!(result.kind(), Some(FaultKind::Exception));
}

#[test]
fn test_config_from_json() {
    let config: RuntimeConfig = serde_json::from_value(json!({
        "nodeModules": { "custom-module": { "index.js": "export default 'json'" } },
        "mountFs": { "src": { "custom.js": "export const x = 1" } }
    }))
    .unwrap();
    let sandbox = JsSandbox::new(config).unwrap();

    let result = run(
        &sandbox,
        "import v from 'custom-module'\nimport { x } from './custom.js'\nexport default [v, x]",
    );
    assert_eq!(result.data(), Some(&json!(["json", 1])));
}

#[test]
fn test_malformed_tree_fails_construction() {
    let config = RuntimeConfig::builder()
        .mount("src", FileTree::dir().with("../escape.js", "export default 1"))
        .build();
    let err = JsSandbox::new(config).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_throw_after_caught_dynamic_miss_stays_exception() {
    let sandbox = JsSandbox::new(RuntimeConfig::default()).unwrap();

    let result = run(
        &sandbox,
        "try { await import('a') } catch (e) {}\nthrow new Error('bad')",
    );
    assert_eq!(result.kind(), Some(FaultKind::Exception));
    assert!(result.error().unwrap().message.contains("Error: bad"));
}

#[test]
fn test_error_naming_a_missing_module_stays_exception() {
    let sandbox = JsSandbox::new(RuntimeConfig::default()).unwrap();

    let result = run(
        &sandbox,
        r#"
        try { await import('left-pad') } catch (e) {}
        throw new Error('left-pad is unavailable, falling back')
        "#,
    );
    assert_eq!(result.kind(), Some(FaultKind::Exception));
}

#[test]
fn test_uncaught_dynamic_miss_is_exception() {
    let sandbox = JsSandbox::new(RuntimeConfig::default()).unwrap();

    let result = run(&sandbox, "const m = await import('nope')\nexport default m");
    assert_eq!(result.kind(), Some(FaultKind::Exception));
}
