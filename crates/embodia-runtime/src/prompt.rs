//! System prompt generated from the registered action catalog.

use std::fmt::Write as _;

use embodia_types::ActionSignature;

const PERSONA: &str = "\
You are the brain of a desktop six-axis robot arm with a suction pump, an RGB \
status LED and a top-view camera. You receive the user's spoken instruction \
and, when available, a description of the objects the camera sees. Answer \
briefly and plan the actions that carry out the instruction.";

/// Render the seeded system turn for `catalog`.
pub fn system_prompt(catalog: &[ActionSignature]) -> String {
    let mut prompt = String::from(PERSONA);
    prompt.push_str("\n\n## Available actions\n");
    if catalog.is_empty() {
        prompt.push_str("(none; answer without actions)\n");
    }
    for sig in catalog {
        let _ = write!(prompt, "- {sig} [{}]", sig.subsystem);
        if sig.recovery {
            prompt.push_str(" (returns the subsystem to a safe pose)");
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\n## Example\n\
         Instruction: First return to zero, then shake your head.\n\
         {\"response\": \"OK, returning to zero and shaking my head.\", \
         \"function\": [\"move_to_zero()\", \"head_shake()\"]}\n",
    );
    prompt
}
