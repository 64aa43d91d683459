//! Basic example of evaluating JavaScript modules in the sandbox.
//!
//! Run with: cargo run --example basic_execution
//!
//! Set `RUST_LOG=quickjs_sandbox_rs=debug` to watch each call move through
//! its phases.

use quickjs_sandbox_rs::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RuntimeConfig::builder()
        .max_memory(32 * 1024 * 1024) // 32MB
        .build();

    println!("Creating sandbox with config: {:?}", config);
    let sandbox = JsSandbox::new(config)?;

    println!("\n=== Test 1: Simple arithmetic ===");
    let result = sandbox.evaluate("export default 1 + 1", EvalOptions::default())?;
    println!("{}", result.to_json());

    println!("\n=== Test 2: Console output ===");
    let code = r#"
for (let i = 0; i < 3; i++) console.log(`Count: ${i}`)
export default 'done'
"#;
    let result = sandbox.evaluate(code, EvalOptions::from_millis(1000))?;
    println!("console:\n{}", sandbox.console().to_string_lossy());
    println!("result: {}", result.to_json());

    println!("\n=== Test 3: Built-in shims ===");
    let code = r#"
import path from 'path'
import { format } from 'util'
export default format('%s has extension %s', 'index.js', path.extname('index.js'))
"#;
    let result = sandbox.evaluate(code, EvalOptions::default())?;
    println!("{}", result.to_json());

    println!("\n=== Test 4: Top-level await (off the async runtime) ===");
    let code = r#"
const value = await new Promise((resolve) => Promise.resolve(21).then((n) => resolve(n * 2)))
export default { value }
"#;
    let result = sandbox.evaluate_async(code, EvalOptions::default()).await?;
    println!("{}", result.to_json());

    println!("\n=== Test 5: Timeout ===");
    let result = sandbox.evaluate("while (true) {}", EvalOptions::from_millis(50))?;
    println!("{}", result.to_json());

    sandbox.dispose();
    println!("\nSandbox disposed: {}", sandbox.is_disposed());

    Ok(())
}
