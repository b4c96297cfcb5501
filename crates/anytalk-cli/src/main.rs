//! DEMO ONLY - Do not use or waste time on this!
//!
//! A manual test harness for `anytalk-core`: start/stop/cancel a
//! session from the keyboard and watch events print live. Needs
//! `ANYTALK_APP_ID` and `ANYTALK_ACCESS_TOKEN` set, and a working
//! microphone.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anytalk_core::{Config, Context, Event};

const BANNER: &str = r#"
╔═══════════════════════════════════════════════════════════════╗
║   ⚠️  WARNING: THIS IS JUST A DEMO - DON'T WASTE TIME ON IT!     ║
║                                                                 ║
║   Commands: start, stop, cancel, quit                          ║
╚═══════════════════════════════════════════════════════════════╝
"#;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("{BANNER}");

    let callback: Arc<dyn Fn(Event) + Send + Sync> = Arc::new(|event| match event {
        Event::Partial(text) => println!("… {text}"),
        Event::Final(text) => println!("✓ {text}"),
        Event::Status(text) => println!("[status] {text}"),
        Event::Error(text) => eprintln!("[error] {text}"),
    });

    let ctx = Context::init(Config::new(), callback);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        print!("> ");
        io::stdout().flush().ok();

        match line.trim() {
            "start" => ctx.start_session(),
            "stop" => ctx.stop_session(),
            "cancel" => ctx.cancel(),
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command: {other:?}"),
        }
    }

    ctx.destroy();
}
