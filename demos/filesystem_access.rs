//! Example of granting filesystem access to sandboxed code.
//!
//! Run with: cargo run --example filesystem_access
//!
//! The sandbox only sees a directory the host chooses. Everything else is
//! outside its root.

use std::sync::Arc;

use quickjs_sandbox_rs::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Filesystem Access Example ===\n");

    let code = r#"
import { readFile, writeFile, readdir } from 'fs/promises'

let before
try {
    before = await readFile('/notes.txt')
} catch (e) {
    before = `no notes yet (${e.code})`
}
await writeFile('/notes.txt', `written at ${new Date().toISOString()}`)

export default { before, files: await readdir('/') }
"#;

    println!("--- Without the capability ---");
    let sandbox = JsSandbox::new(RuntimeConfig::default())?;
    let result = sandbox.evaluate(code, EvalOptions::from_millis(1000))?;
    println!("{}", result.to_json());

    println!("\n--- In-memory filesystem ---");
    let memory = Arc::new(MemoryFs::new());
    let sandbox = JsSandbox::new(RuntimeConfig::builder().filesystem(memory).build())?;
    for run in 1..=2 {
        let result = sandbox.evaluate(code, EvalOptions::from_millis(1000))?;
        println!("run {}: {}", run, result.to_json());
    }

    println!("\n--- Host directory ---");
    let root = std::env::temp_dir().join("quickjs-sandbox-demo");
    std::fs::create_dir_all(&root)?;
    let sandbox = JsSandbox::new(
        RuntimeConfig::builder()
            .filesystem(Arc::new(HostFs::new(&root)?))
            .build(),
    )?;
    let result = sandbox.evaluate(code, EvalOptions::from_millis(1000))?;
    println!("{}", result.to_json());
    println!("Host file now contains: {}", std::fs::read_to_string(root.join("notes.txt"))?);

    Ok(())
}
