//! Text handed to the writing agent when an idea is auto-written.

use pubscout_core::types::{Idea, Publication};

/// Longest slug we generate.
const MAX_SLUG_LEN: usize = 80;

/// Markdown research brief used to seed a new writing session.
pub fn build_seed_context(idea: &Idea, publication: &Publication) -> String {
    let mut context = String::from("## Writing Assignment\n\n");
    context.push_str(&format!("**Title:** {}\n", idea.title));
    context.push_str(&format!("**Angle:** {}\n\n", idea.angle));
    context.push_str(&format!("**Brief:**\n{}\n\n", idea.summary));

    if let Some(tone) = tone(publication) {
        context.push_str(&format!("**Writing Tone:** {tone}\n\n"));
    }

    if !idea.sources.is_empty() {
        context.push_str("## Source Material\n\n");
        for source in &idea.sources {
            context.push_str(&format!(
                "### {}\nURL: {}\n{}\n\n",
                source.title, source.url, source.snippet
            ));
        }
    }
    context
}

/// Instruction asking the agent for a complete, publishable draft.
pub fn build_write_instruction(idea: &Idea, publication: &Publication) -> String {
    let mut instruction = format!(
        "Please write a complete blog post based on the research context provided. \
         The post should be titled \"{}\" and take the following angle: {}\n\n",
        idea.title, idea.angle
    );
    instruction.push_str(&format!("Key points to cover:\n{}\n\n", idea.summary));

    if let Some(tone) = tone(publication) {
        instruction.push_str(&format!("Writing style: {tone}\n\n"));
    }

    instruction.push_str(
        "Research the topic using the available tools, then write a thorough, well-sourced post. \
         Include citations where appropriate. The post should be ready for publication.",
    );
    instruction
}

fn tone(publication: &Publication) -> Option<&str> {
    publication
        .writing_tone
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// URL slug: lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '\'' || c == '’' {
            // "Don't" → "dont"
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}
