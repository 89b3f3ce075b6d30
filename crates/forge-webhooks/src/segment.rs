//! Segment chaining for long-form outputs.
//!
//! A job carrying `segment_prompts` renders one segment at a time; each
//! completion enqueues the next segment with the previous segment's last
//! output as its keyframe, so the clip stays visually continuous.

use forge_core::Job;
use serde_json::Value;

/// The follow-up job for the next segment, if one remains.
///
/// Returns `None` for unsegmented jobs, for the final segment, and when the
/// completed segment produced no output to chain from.
#[must_use]
pub fn next_segment(job: &Job, outputs: &[String]) -> Option<Job> {
    let prompts = job.input.segment_prompts()?;
    let next_index = job.input.segment_index() + 1;
    let prompt = prompts.get(next_index as usize)?.to_string();
    let keyframe = outputs.last()?;

    let mut input = job.input.clone();
    input.set("prompt", Value::String(prompt));
    input.set("segment_index", Value::from(next_index));
    input.set("keyframe_url", Value::String(keyframe.clone()));

    Some(Job::new(job.model_id.clone(), input, job.user_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::{GenerationInput, JobStatus};
    use serde_json::json;

    fn segmented_job(index: u32) -> Job {
        let input: GenerationInput = serde_json::from_value(json!({
            "prompt": "opening shot",
            "segment_prompts": ["opening shot", "the chase", "the finale"],
            "segment_index": index,
            "duration_secs": 4,
        }))
        .expect("valid input");
        Job::new("svd-video", input, "user-1")
    }

    #[test]
    fn test_chains_to_next_segment() {
        let job = segmented_job(0);
        let outputs = vec!["https://cdn.test/seg0.mp4".to_string()];

        let next = next_segment(&job, &outputs).expect("next segment");

        assert_eq!(next.model_id, "svd-video");
        assert_eq!(next.user_id, "user-1");
        assert_eq!(next.status, JobStatus::Queued);
        assert_ne!(next.id, job.id);
        assert_eq!(next.input.prompt(), Some("the chase"));
        assert_eq!(next.input.segment_index(), 1);
        assert_eq!(next.input.keyframe_url(), Some("https://cdn.test/seg0.mp4"));
        // Unrelated parameters carry over
        assert_eq!(next.input.duration_secs(), Some(4));
    }

    #[test]
    fn test_last_segment_ends_chain() {
        let job = segmented_job(2);
        let outputs = vec!["https://cdn.test/seg2.mp4".to_string()];
        assert!(next_segment(&job, &outputs).is_none());
    }

    #[test]
    fn test_unsegmented_job_has_no_chain() {
        let input: GenerationInput =
            serde_json::from_value(json!({ "prompt": "a single image" })).expect("valid input");
        let job = Job::new("flux-dev", input, "user-1");
        assert!(next_segment(&job, &["https://cdn.test/out.png".to_string()]).is_none());
    }

    #[test]
    fn test_no_outputs_no_chain() {
        let job = segmented_job(0);
        assert!(next_segment(&job, &[]).is_none());
    }

    #[test]
    fn test_uses_last_output_as_keyframe() {
        let job = segmented_job(0);
        let outputs = vec![
            "https://cdn.test/a.mp4".to_string(),
            "https://cdn.test/b.mp4".to_string(),
        ];

        let next = next_segment(&job, &outputs).expect("next segment");
        assert_eq!(next.input.keyframe_url(), Some("https://cdn.test/b.mp4"));
    }
}
