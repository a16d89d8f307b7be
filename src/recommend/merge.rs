use std::collections::HashMap;

use super::types::Candidate;
use crate::store::{GiftMatch, TestimonialMatch};

/// Merges testimonial- and catalog-sourced matches into one deduplicated,
/// similarity-ranked candidate list.
///
/// Testimonials are folded first, so at equal similarity a testimonial-backed
/// entry wins over a catalog entry: an existing candidate is only replaced
/// when the new similarity is strictly greater. The final sort is stable and
/// descending, keeping insertion order for equal scores.
pub fn rank_candidates(
    testimonials: &[TestimonialMatch],
    gifts: &[GiftMatch],
) -> Vec<Candidate> {
    let sources = testimonials
        .iter()
        .filter_map(|t| t.gift_id.as_deref().map(|id| (id, t.similarity)))
        .chain(gifts.iter().map(|g| (g.id.as_str(), g.similarity)))
        .filter(|(id, _)| !id.is_empty());

    let (mut ranked, _seen) = sources.fold(
        (Vec::new(), HashMap::<String, usize>::new()),
        |(mut order, mut seen), (id, similarity)| {
            match seen.get(id) {
                Some(&idx) => {
                    let existing: &mut Candidate = &mut order[idx];
                    if similarity > existing.similarity {
                        existing.similarity = similarity;
                    }
                }
                None => {
                    seen.insert(id.to_string(), order.len());
                    order.push(Candidate {
                        id: id.to_string(),
                        similarity,
                    });
                }
            }
            (order, seen)
        },
    );

    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
