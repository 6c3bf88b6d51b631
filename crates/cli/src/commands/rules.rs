use amdfw_core::services::detect::RuleSpec;
use anyhow::Result;

use crate::commands::open_workspace;

/// List the detector rules the workspace will scan images with.
pub fn list_rules_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_workspace(root)?;
    let rules: Vec<&RuleSpec> = ctx.detector.rules().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("Rules: (none)");
        return Ok(());
    }

    println!("Rules:");
    for rule in rules {
        match &rule.description {
            Some(desc) => println!("- {}: {} ({})", rule.name, rule.pattern, desc),
            None => println!("- {}: {}", rule.name, rule.pattern),
        }
    }
    Ok(())
}
