//! Expands a `ShaderSpec` into the minimal set of unique, valid compile
//! jobs. Every integer below `2^variation_count` is a candidate activation
//! mask; include/exclude/require rules and variation exclusivity are applied
//! as a pure transformation over the mask, then duplicates are dropped. The
//! output order depends only on the input, so repeated runs over the same
//! definition produce byte-identical containers.
use std::collections::HashMap;

use thiserror::Error;

use crate::spec::{CompileJob, ShaderSpec, VariationDef};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("shader '{name}' declares {count} variations; the activation mask holds at most 32")]
    TooManyVariations { name: String, count: usize },
}

/// Resolves all unique, valid combinations of a base shader's variations
/// into compile jobs, in ascending candidate-mask order.
///
/// `global_defines` take part in `require` checks only; they are appended
/// to each job's define list later, at compile time.
pub fn resolve_combinations(
    spec: &ShaderSpec,
    global_defines: &[String],
) -> Result<Vec<CompileJob>, ResolveError> {
    let variations = &spec.variations;
    if variations.len() > 32 {
        return Err(ResolveError::TooManyVariations {
            name: spec.name.clone(),
            count: variations.len(),
        });
    }

    let bit_for_name: HashMap<&str, u32> = variations
        .iter()
        .enumerate()
        .map(|(index, def)| (def.name.as_str(), index as u32))
        .collect();
    let has_variations = variations.iter().any(|def| !def.is_option);

    let candidate_count: u64 = 1u64 << variations.len();
    let mut used_masks: Vec<u32> = Vec::new();
    let mut jobs = Vec::new();

    for candidate in 0..candidate_count {
        let active = effective_mask(candidate as u32, variations, &bit_for_name);

        // A variation is mandatory whenever any non-option entry exists.
        if has_variations && !variation_active(active, variations) {
            continue;
        }

        if !requires_satisfied(active, variations, global_defines) {
            continue;
        }

        // Linear scan is fine: the mask space is bounded by 32 bits and this
        // runs once per shader at asset-build time.
        if used_masks.contains(&active) {
            continue;
        }
        used_masks.push(active);

        jobs.push(materialize(spec, active));
    }

    Ok(jobs)
}

/// Applies the include/exclude/exclusivity closure to a candidate mask.
///
/// Iterated to a fixpoint so that an include pulled in by a later bit still
/// has its own rules applied; the result re-run through the closure yields
/// itself.
fn effective_mask(
    candidate: u32,
    variations: &[VariationDef],
    bit_for_name: &HashMap<&str, u32>,
) -> u32 {
    let mut active = candidate;

    // Each pass can only cascade one rule level; the entry count bounds how
    // many passes any chain needs to settle.
    for _ in 0..=variations.len() {
        let before = active;

        for (index, def) in variations.iter().enumerate() {
            if active >> index & 1 == 0 {
                continue;
            }

            for include in &def.includes {
                if let Some(&bit) = bit_for_name.get(include.as_str()) {
                    active |= 1 << bit;
                }
            }
            for exclude in &def.excludes {
                if let Some(&bit) = bit_for_name.get(exclude.as_str()) {
                    active &= !(1 << bit);
                }
            }

            // At most one true variation per combination: an active
            // non-option clears every other non-option bit.
            if !def.is_option {
                for (other, other_def) in variations.iter().enumerate() {
                    if other != index && !other_def.is_option {
                        active &= !(1 << other);
                    }
                }
            }
        }

        if active == before {
            break;
        }
    }

    active
}

fn variation_active(active: u32, variations: &[VariationDef]) -> bool {
    variations
        .iter()
        .enumerate()
        .any(|(index, def)| !def.is_option && active >> index & 1 == 1)
}

/// Checks every `require` entry of every active definition against the
/// *effective* mask, so a requirement satisfied only by an entry the
/// closure just excluded correctly fails.
fn requires_satisfied(active: u32, variations: &[VariationDef], global_defines: &[String]) -> bool {
    for (index, def) in variations.iter().enumerate() {
        if active >> index & 1 == 0 {
            continue;
        }

        'requirement: for required in &def.requires {
            if global_defines.iter().any(|define| define == required) {
                continue 'requirement;
            }

            for (other, other_def) in variations.iter().enumerate() {
                if other == index || active >> other & 1 == 0 {
                    continue;
                }
                if other_def.name == *required
                    || other_def.defines.iter().any(|define| define == required)
                {
                    continue 'requirement;
                }
            }

            return false;
        }
    }

    true
}

/// Builds the job for an accepted mask: name and defines concatenate the
/// active entries in declaration order. Options commonly contribute no name
/// text.
fn materialize(spec: &ShaderSpec, active: u32) -> CompileJob {
    let mut name = String::new();
    let mut defines = Vec::new();

    for (index, def) in spec.variations.iter().enumerate() {
        if active >> index & 1 == 1 {
            name.push_str(&def.name);
            defines.extend(def.defines.iter().cloned());
        }
    }

    CompileJob::new(spec.stage, name, defines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShaderStage;

    fn spec_with(variations: Vec<VariationDef>) -> ShaderSpec {
        ShaderSpec {
            name: "Test".into(),
            stage: ShaderStage::Fragment,
            variations,
        }
    }

    fn variation(name: &str, define: &str) -> VariationDef {
        let mut def = VariationDef::new(name, false);
        def.defines.push(define.into());
        def
    }

    fn option(name: &str, define: &str) -> VariationDef {
        let mut def = VariationDef::new(name, true);
        def.defines.push(define.into());
        def
    }

    #[test]
    fn zero_variations_yield_single_empty_job() {
        let jobs = resolve_combinations(&spec_with(Vec::new()), &[]).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].name.is_empty());
        assert!(jobs[0].defines.is_empty());
    }

    #[test]
    fn rejects_more_than_32_variations() {
        let variations = (0..33).map(|i| option(&format!("O{i}"), "X")).collect();
        let err = resolve_combinations(&spec_with(variations), &[]).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::TooManyVariations { count: 33, .. }
        ));
    }

    #[test]
    fn option_and_variation_scenario() {
        let spec = spec_with(vec![option("A", "A_ON"), variation("B", "B_ON")]);
        let jobs = resolve_combinations(&spec, &[]).unwrap();

        // A variation exists, so every accepted combination must contain B.
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "B");
        assert_eq!(jobs[0].defines, vec!["B_ON".to_string()]);
        assert_eq!(jobs[1].name, "AB");
        assert_eq!(jobs[1].defines, vec!["A_ON".to_string(), "B_ON".to_string()]);
    }

    #[test]
    fn variations_are_mutually_exclusive() {
        let spec = spec_with(vec![variation("Dir", "DIRLIGHT"), variation("Spot", "SPOTLIGHT")]);
        let jobs = resolve_combinations(&spec, &[]).unwrap();

        let names: Vec<_> = jobs.iter().map(|job| job.name.as_str()).collect();
        assert_eq!(names, vec!["Dir", "Spot"]);
    }

    #[test]
    fn includes_dedup_combinations() {
        let mut with_include = option("A", "A_ON");
        with_include.includes.push("B".into());
        let spec = spec_with(vec![with_include, option("B", "B_ON")]);

        let jobs = resolve_combinations(&spec, &[]).unwrap();
        // Candidates {A} and {A,B} collapse to the same effective mask.
        let names: Vec<_> = jobs.iter().map(|job| job.name.as_str()).collect();
        assert_eq!(names, vec!["", "AB", "B"]);
    }

    #[test]
    fn requirement_satisfied_by_global_define() {
        let mut needs_fog = option("Fog", "FOG");
        needs_fog.requires.push("SM3".into());
        let spec = spec_with(vec![needs_fog]);

        let without = resolve_combinations(&spec, &[]).unwrap();
        assert_eq!(without.len(), 1);
        assert!(without[0].name.is_empty());

        let with = resolve_combinations(&spec, &["SM3".into()]).unwrap();
        assert_eq!(with.len(), 2);
        assert_eq!(with[1].name, "Fog");
    }

    #[test]
    fn requirement_satisfied_by_active_entry_define() {
        let mut needs_light = option("Shadow", "SHADOW");
        needs_light.requires.push("PERPIXEL".into());
        let spec = spec_with(vec![needs_light, option("Point", "PERPIXEL")]);

        let jobs = resolve_combinations(&spec, &[]).unwrap();
        let names: Vec<_> = jobs.iter().map(|job| job.name.as_str()).collect();
        // {Shadow} alone fails its requirement and is dropped.
        assert_eq!(names, vec!["", "Point", "ShadowPoint"]);
    }

    #[test]
    fn requirement_checked_after_exclusions() {
        let mut excluder = variation("Deferred", "DEFERRED");
        excluder.excludes.push("Ambient".into());
        let mut needs_ambient = option("Soft", "SOFT");
        needs_ambient.requires.push("Ambient".into());
        let spec = spec_with(vec![excluder, needs_ambient, option("Ambient", "AMBIENT")]);

        let jobs = resolve_combinations(&spec, &[]).unwrap();
        // Soft only survives alongside Ambient, which Deferred always
        // excludes, so no accepted combination contains Soft.
        assert!(jobs.iter().all(|job| !job.name.contains("Soft")));
        assert!(jobs.iter().any(|job| job.name == "Deferred"));
    }

    #[test]
    fn effective_masks_are_idempotent_and_unique() {
        let mut chained = option("A", "A_ON");
        chained.includes.push("B".into());
        let mut second = option("B", "B_ON");
        second.includes.push("C".into());
        let spec = spec_with(vec![chained, second, option("C", "C_ON"), variation("V", "V_ON")]);

        let bit_for_name: HashMap<&str, u32> = spec
            .variations
            .iter()
            .enumerate()
            .map(|(index, def)| (def.name.as_str(), index as u32))
            .collect();

        for candidate in 0..(1u32 << spec.variations.len()) {
            let mask = effective_mask(candidate, &spec.variations, &bit_for_name);
            assert_eq!(
                effective_mask(mask, &spec.variations, &bit_for_name),
                mask,
                "closure must be idempotent for candidate {candidate:#b}"
            );
        }

        let jobs = resolve_combinations(&spec, &[]).unwrap();
        let mut names: Vec<_> = jobs.iter().map(|job| job.name.clone()).collect();
        let before_dedup = names.len();
        names.dedup();
        assert_eq!(names.len(), before_dedup, "no duplicate combinations");
    }
}
