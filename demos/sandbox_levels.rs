//! Show which libraries guest code can reach at each sandbox level.
//!
//! Run with: cargo run --example sandbox_levels

use std::rc::Rc;

use lua_ext_env::prelude::*;
use lua_ext_env::permitted_libraries;

struct NullStyler;

impl Styler for NullStyler {
    fn import_stylesheet(&self, _sheet: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

const GLOBALS: [&str; 6] = ["string", "require", "io", "dofile", "os", "debug"];

fn main() -> Result<()> {
    let styler = Rc::new(NullStyler);
    let args = Rc::new(DocArgs::new());
    let names = Rc::new(NameRegistry::new());

    for level in [
        SandboxLevel::Strict,
        SandboxLevel::Standard,
        SandboxLevel::Unrestricted,
        SandboxLevel::Unsound,
    ] {
        let params = ExtParams::new(
            EnvConfig::builder().sandbox(level).build(),
            styler.clone(),
            Rc::clone(&args),
            Rc::clone(&names),
        );
        let env = ExtensionEnv::new(&params)?;

        let libraries: Vec<&str> = permitted_libraries(level)
            .map(|lib| lib.global_name())
            .collect();
        println!("=== {} (level {}) ===", level, level.level());
        println!("  libraries: {}", libraries.join(", "));

        for name in GLOBALS {
            let present: bool = env
                .lua()
                .load(format!("return {} ~= nil", name))
                .eval()?;
            println!("  {:<8} {}", name, if present { "yes" } else { "no" });
        }

        env.destroy();
    }

    Ok(())
}
