//! Human-readable rendering of sweep progress and results.

use crate::goal::{FeedbackSample, GoalResult};

/// Render a feedback sample as a progress report
pub fn render(sample: &FeedbackSample) -> String {
    format!(
        "\nFEEDBACK:\n  - Current angular position = {:.1} degrees.\n  - Image(s) captured so far = {}.",
        sample.current_angle, sample.current_image
    )
}

/// Render the result of a completed sweep
pub fn render_result(result: &GoalResult) -> String {
    format!(
        "The action has completed.\nResult:\n  - Image Path = {}",
        result.image_path
    )
}
