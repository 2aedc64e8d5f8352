//! Demo test program with passing, failing and crashing tests.
//!
//! ```bash
//! ensayo-demo --list
//! ensayo-demo demo.arith       # one compile unit
//! ensayo-demo -j 4 --format progress
//! ```

use ensayo::{expect_log, fail, log, not_applicable, Registry};
use ensayador::embedded_main;
use std::process::ExitCode;
use std::sync::Arc;

fn registry() -> Registry {
    Registry::new()
        .with("src/demo/arith.c", "setup", || log("arith fixtures ready"))
        .with("src/demo/arith.c", "test_add", || assert_eq!(2 + 2, 4))
        .with("src/demo/arith.c", "test_overflow", || {
            let small: u8 = 200;
            assert!(small.checked_add(100).is_some(), "200 + 100 overflows u8");
        })
        .with("src/demo/arith.c", "cleanup", || {})
        .with("src/demo/proc.c", "test_abort", || std::process::abort())
        .with("src/demo/proc.c", "test_exit", || std::process::exit(3))
        .with("src/demo/proc.c", "test_skip", || not_applicable())
        .with("src/demo/proc.c", "test_logged", || {
            expect_log("^hello");
            log("hello from the test");
        })
        .with("src/demo/proc.c", "test_explicit", || fail("explicitly failed"))
}

fn main() -> ExitCode {
    let registry = registry();
    embedded_main(&registry.clone(), Arc::new(registry))
}
