use crate::state::StudyContext;

const TUTOR_INSTRUCTION: &str = "You are a friendly, patient tutor for school students. \
Answer clearly, use short paragraphs and examples suited to the student's level, \
and guide the student towards understanding rather than just giving answers.";

fn audience(ctx: &StudyContext) -> String {
    match (&ctx.course, &ctx.chapter) {
        (Some(course), Some(chapter)) => format!(
            "a grade {} student studying {} (chapter: {})",
            course.grade, course.subject, chapter
        ),
        (Some(course), None) => format!("a grade {} student studying {}", course.grade, course.subject),
        (None, _) => "a school student".to_string(),
    }
}

pub fn build_explanation_prompt(ctx: &StudyContext, topic: &str) -> String {
    let mut result = String::with_capacity(topic.len() + 320);
    result.push_str("Explain the topic \"");
    result.push_str(topic);
    result.push_str("\" to ");
    result.push_str(&audience(ctx));
    result.push_str(". Format the answer in Markdown with a heading, short sections and bullet points. ");
    result.push_str("Keep it accurate, engaging and no longer than about 400 words.");
    result
}

pub fn build_visual_prompt(ctx: &StudyContext, topic: &str) -> String {
    format!(
        "Describe, as a single detailed prompt for an illustration generator, one clear diagram or \
         picture that would help {} understand \"{}\". Mention the key labelled parts and their layout. \
         Reply with the prompt text only.",
        audience(ctx),
        topic
    )
}

pub fn build_real_world_prompt(ctx: &StudyContext, topic: &str) -> String {
    format!(
        "Give one vivid real-world example that shows \"{}\" in everyday life for {}. \
         Explain in a few short Markdown paragraphs how the example connects to the idea.",
        topic,
        audience(ctx)
    )
}

pub fn build_mcq_prompt(ctx: &StudyContext, topic: &str) -> String {
    format!(
        "Write 5 multiple-choice questions about \"{}\" for {}. \
         Reply with a JSON array only. Each element must be an object with the fields \
         \"question\" (string), \"options\" (array of exactly 4 strings), \
         \"correctAnswer\" (one of the options, copied exactly) and \"explanation\" (string).",
        topic,
        audience(ctx)
    )
}

pub fn build_unit_test_prompt(ctx: &StudyContext, chapter: &str) -> String {
    format!(
        "Write a unit test covering the chapter \"{}\" for {}. Include 10 questions mixing three types. \
         Reply with a JSON object only, of the form {{\"questions\": [...]}}. Each question is an object with a \
         \"type\" field: \"multipleChoice\" questions have \"question\", \"options\" (4 strings) and \
         \"correctAnswer\"; \"shortAnswer\" questions have \"question\" and \"answer\" (string); \
         \"trueFalse\" questions have \"question\" and \"answer\" (boolean).",
        chapter,
        audience(ctx)
    )
}

pub fn build_more_topics_prompt(ctx: &StudyContext, chapter: &str, seen: &[String]) -> String {
    let mut result = format!(
        "List up to 8 important topics from the chapter \"{}\" for {}.",
        chapter,
        audience(ctx)
    );
    if !seen.is_empty() {
        result.push_str(" Do not repeat any of these topics: ");
        result.push_str(&seen.join(", "));
        result.push('.');
    }
    result.push_str(" Reply with a JSON array of short topic titles only.");
    result
}

pub fn build_narration_prompt(script: &str) -> String {
    let mut result = String::with_capacity(script.len() + 64);
    result.push_str("Read the following aloud in a warm, clear teaching voice:\n\n");
    result.push_str(&strip_markdown(script));
    result
}

pub fn build_tutor_instruction(ctx: &StudyContext) -> String {
    format!("{} You are helping {}.", TUTOR_INSTRUCTION, audience(ctx))
}

/// Ensures an explanation starts with a Markdown heading, using the topic
/// as the title when the model left one out.
pub fn ensure_heading(text: &str, topic: &str) -> String {
    let text = text.trim();
    if text.starts_with('#') {
        return text.to_string();
    }
    format!("# {}\n\n{}", topic, text)
}

/// Removes a surrounding ``` fence, which models add around JSON even when
/// asked not to.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Drops Markdown markers so narration does not read them out.
fn strip_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.lines() {
        let line = line.trim().trim_start_matches('#').trim_start_matches(['-', '*']).trim();
        if line.is_empty() {
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&line.replace("**", "").replace('`', ""));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Course;

    #[test]
    fn prompts_mention_the_audience() {
        let ctx = StudyContext {
            course: Some(Course { grade: "7".into(), subject: "Biology".into() }),
            chapter: Some("Plants".into()),
        };
        let prompt = build_explanation_prompt(&ctx, "Photosynthesis");
        assert!(prompt.contains("grade 7 student studying Biology (chapter: Plants)"));
        assert!(build_mcq_prompt(&StudyContext::default(), "Atoms").contains("a school student"));
    }

    #[test]
    fn more_topics_lists_what_was_seen() {
        let prompt = build_more_topics_prompt(&StudyContext::default(), "Motion", &["Speed".into(), "Velocity".into()]);
        assert!(prompt.contains("Do not repeat any of these topics: Speed, Velocity."));
    }

    #[test]
    fn code_fences_are_removed() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[test]
    fn headings_are_added_once() {
        assert_eq!(ensure_heading("Plants make food.", "Photosynthesis"), "# Photosynthesis\n\nPlants make food.");
        assert_eq!(ensure_heading("## Light\nText", "Photosynthesis"), "## Light\nText");
    }

    #[test]
    fn narration_skips_markdown_markers() {
        let prompt = build_narration_prompt("# Title\n\n- **Bold** point\n");
        assert!(prompt.ends_with("Title\nBold point"));
    }
}
