//! Example demonstrating error handling patterns.
//!
//! This example shows how each kind of failure is reported:
//! - Script exceptions
//! - Timeouts and host interrupts
//! - Missing modules
//! - Unmarshalable results
//! - Configuration errors
//!
//! Run with: cargo run --example error_handling

use std::thread;
use std::time::Duration;

use quickjs_sandbox_rs::prelude::*;
use tracing_subscriber::EnvFilter;

fn describe(result: &EvaluationResult) {
    match result {
        EvaluationResult::Ok(data) => println!("ok: {}", data),
        EvaluationResult::Err(err) => {
            println!("kind: {}", err.kind);
            println!("message: {}", err.message);
            if let Some(stack) = &err.stack {
                println!("stack:\n{}", stack.trim_end());
            }
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Error Handling Example ===\n");

    let sandbox = JsSandbox::new(RuntimeConfig::default())?;

    println!("--- Test 1: Thrown error ---");
    describe(&sandbox.evaluate(
        "const parse = (s) => { throw new RangeError(`cannot parse ${s}`) }\nexport default parse('x')",
        EvalOptions::default(),
    )?);
    println!();

    println!("--- Test 2: Syntax error ---");
    describe(&sandbox.evaluate("export default {", EvalOptions::default())?);
    println!();

    println!("--- Test 3: Timeout ---");
    describe(&sandbox.evaluate("while (true) {}", EvalOptions::from_millis(100))?);
    println!();

    println!("--- Test 4: Host interrupt ---");
    {
        let handle = sandbox.interrupt_handle();
        let worker = {
            let sandbox = sandbox.clone();
            thread::spawn(move || sandbox.evaluate("for (;;) {}", EvalOptions::default()))
        };
        thread::sleep(Duration::from_millis(50));
        handle.interrupt();
        match worker.join() {
            Ok(result) => describe(&result?),
            Err(_) => eprintln!("worker panicked"),
        }
    }
    println!();

    println!("--- Test 5: Missing module ---");
    describe(&sandbox.evaluate("import pad from 'left-pad'\nexport default pad", EvalOptions::default())?);
    println!();

    println!("--- Test 6: Unmarshalable result ---");
    describe(&sandbox.evaluate("export default 2n ** 64n", EvalOptions::default())?);
    println!();

    println!("--- Test 7: Capability denied ---");
    describe(&sandbox.evaluate(
        "import { readFileSync } from 'fs'\nexport default readFileSync('/etc/hosts')",
        EvalOptions::default(),
    )?);
    println!();

    println!("--- Test 8: Configuration error ---");
    match JsSandbox::new(RuntimeConfig::builder().allow_fs(true).build()) {
        Ok(_) => println!("unexpectedly succeeded"),
        Err(e) => println!("error: {} (config: {})", e, e.is_config()),
    }
    println!();

    println!("--- Test 9: Using a disposed runtime ---");
    sandbox.dispose();
    match sandbox.evaluate("export default 1", EvalOptions::default()) {
        Ok(_) => println!("unexpectedly succeeded"),
        Err(e) => println!("error: {} (disposed: {})", e, e.is_disposed()),
    }

    Ok(())
}
