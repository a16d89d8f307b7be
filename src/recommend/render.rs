use std::fmt::Write;

use crate::store::{GiftMatch, TestimonialMatch};

/// Returned as the whole context when neither search produced evidence.
pub const NO_EVIDENCE_FALLBACK: &str = "No reference testimonials or gift information are \
available yet; recommendations will be based on general knowledge.";

/// Renders retrieved records into the context block injected into the
/// generation prompt.
///
/// Testimonials render as numbered blocks separated by blank lines; catalog
/// matches, when present, render as a `[Related Gifts]` section appended
/// after the testimonial section with its own separator. Record text is
/// embedded as-is: user-provided free text is opaque here and is never
/// reinterpreted as formatting.
pub fn render_context(testimonials: &[TestimonialMatch], gifts: &[GiftMatch]) -> String {
    let testimonial_section = render_testimonials(testimonials);
    let gift_section = render_gifts(gifts);

    if testimonial_section.is_empty() && gift_section.is_empty() {
        return NO_EVIDENCE_FALLBACK.to_string();
    }

    format!("{}{}", testimonial_section, gift_section)
}

fn render_testimonials(testimonials: &[TestimonialMatch]) -> String {
    testimonials
        .iter()
        .enumerate()
        .map(|(index, t)| {
            format!(
                "[Testimonial {}: {}]\nSituation: {}\nContent: {}\n(similarity: {}%)",
                index + 1,
                t.title,
                t.situation,
                t.content,
                format_percent(t.similarity)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_gifts(gifts: &[GiftMatch]) -> String {
    if gifts.is_empty() {
        return String::new();
    }

    let mut section = String::from("\n\n[Related Gifts]");
    for (index, g) in gifts.iter().enumerate() {
        let _ = write!(section, "\n{}. {}", index + 1, g.name);
        if let Some(description) = &g.description {
            let _ = write!(section, ": {}", description);
        }
        let _ = write!(section, " (similarity: {}%)", format_percent(g.similarity));
    }
    section
}

fn format_percent(similarity: f32) -> String {
    format!("{:.1}", similarity * 100.0)
}
