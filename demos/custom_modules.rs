//! Example of injecting packages and mounting source trees.
//!
//! Run with: cargo run --example custom_modules

use quickjs_sandbox_rs::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Custom Modules Example ===\n");

    // Packages go under /node_modules and are imported by name. Mounts are
    // placed at the root; the evaluated code itself is /src/index.js.
    let config = RuntimeConfig::builder()
        .node_module(
            "greeter",
            FileTree::dir()
                .with("index.js", "export { greet } from './lib/greet.js'")
                .with("lib/greet.js", "export const greet = (name) => `hello, ${name}`"),
        )
        .mount(
            "src",
            FileTree::dir()
                .with("names.js", "export default ['ada', 'grace']")
                .with("util/shout.js", "export const shout = (s) => s.toUpperCase()"),
        )
        .build();

    let sandbox = JsSandbox::new(config)?;

    let code = r#"
import { greet } from 'greeter'
import names from './names.js'
import { shout } from './util/shout.js'

export default names.map((n) => shout(greet(n)))
"#;
    let result = sandbox.evaluate(code, EvalOptions::from_millis(1000))?;
    println!("Greetings: {}", result.to_json());

    // The same configuration can be loaded from JSON.
    let config: RuntimeConfig = serde_json::from_value(json!({
        "nodeModules": {
            "custom-module": { "index.js": "export default 'hi'" }
        },
        "mountFs": {
            "src": { "custom.js": "export const answer = 42" }
        }
    }))
    .map_err(|e| SandboxError::Config(e.to_string()))?;

    let sandbox = JsSandbox::new(config)?;
    let code = r#"
import hi from 'custom-module'
import { answer } from './custom.js'
export default { hi, answer }
"#;
    let result = sandbox.evaluate(code, EvalOptions::default())?;
    println!("From JSON config: {}", result.to_json());

    println!("\n--- Missing module ---");
    let result = sandbox.evaluate("import x from 'not-installed'", EvalOptions::default())?;
    println!("{}", result.to_json());

    Ok(())
}
