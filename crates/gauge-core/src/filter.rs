//! Scenario selection.
//!
//! Filters mutate a specification tree in place, retaining only the
//! scenarios that match. A spec whose scenario list becomes empty is
//! dropped from the outer collection.

use std::collections::HashSet;

use crate::spec::{Scenario, SpecItem, SpecItemFilter, Specification};
use crate::tags::TagExpression;

/// Retains the scenarios whose effective tag set (scenario tags ∪ spec
/// tags) satisfies a tag expression.
pub struct ScenarioTagFilter<'a> {
    spec_tags: &'a [String],
    expression: &'a TagExpression,
}

impl<'a> ScenarioTagFilter<'a> {
    pub fn new(spec_tags: &'a [String], expression: &'a TagExpression) -> Self {
        ScenarioTagFilter {
            spec_tags,
            expression,
        }
    }

    fn matches(&self, scenario: &Scenario) -> bool {
        let effective: HashSet<String> = scenario
            .tags
            .iter()
            .chain(self.spec_tags.iter())
            .cloned()
            .collect();
        self.expression.evaluate(&effective)
    }
}

impl SpecItemFilter for ScenarioTagFilter<'_> {
    fn discard(&mut self, item: &SpecItem<'_>) -> bool {
        match item {
            SpecItem::Scenario(scenario) => !self.matches(scenario),
            _ => false,
        }
    }
}

/// Retains only the scenario at a 0-based index, dropping all others.
///
/// Used to split a spec into per-scenario units for fan-out execution.
pub struct ScenarioIndexFilter {
    retain_index: usize,
    current: usize,
}

impl ScenarioIndexFilter {
    pub fn new(retain_index: usize) -> Self {
        ScenarioIndexFilter {
            retain_index,
            current: 0,
        }
    }
}

impl SpecItemFilter for ScenarioIndexFilter {
    fn discard(&mut self, item: &SpecItem<'_>) -> bool {
        match item {
            SpecItem::Scenario(_) => {
                let discard = self.current != self.retain_index;
                self.current += 1;
                discard
            }
            _ => false,
        }
    }
}

/// Filter a collection of specs by a tag expression, dropping specs whose
/// scenario list becomes empty.
pub fn filter_specs_by_tags(
    specs: Vec<Specification>,
    expression: &TagExpression,
) -> Vec<Specification> {
    specs
        .into_iter()
        .filter_map(|mut spec| {
            let spec_tags = std::mem::take(&mut spec.tags);
            spec.filter(&mut ScenarioTagFilter::new(&spec_tags, expression));
            spec.tags = spec_tags;
            (!spec.scenarios.is_empty()).then_some(spec)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Step;

    fn scenario(heading: &str, tags: &[&str]) -> Scenario {
        Scenario {
            heading: heading.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            steps: vec![Step::new("a step", 3)],
            line: 2,
        }
    }

    fn spec(tags: &[&str], scenarios: Vec<Scenario>) -> Specification {
        Specification {
            heading: "Spec".into(),
            file_name: "spec.spec".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            contexts: Vec::new(),
            scenarios,
        }
    }

    #[test]
    fn tag_filter_uses_effective_tag_set() {
        let expression = TagExpression::parse("smoke & fast").unwrap();
        // `smoke` comes from the spec, `fast` from the scenario.
        let specs = vec![spec(
            &["smoke"],
            vec![scenario("s1", &["fast"]), scenario("s2", &["slow"])],
        )];
        let filtered = filter_specs_by_tags(specs, &expression);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].scenarios.len(), 1);
        assert_eq!(filtered[0].scenarios[0].heading, "s1");
    }

    #[test]
    fn untagged_scenario_still_sees_spec_tags() {
        let expression = TagExpression::parse("smoke").unwrap();
        let specs = vec![spec(&["smoke"], vec![scenario("s1", &[])])];
        assert_eq!(filter_specs_by_tags(specs, &expression).len(), 1);
    }

    #[test]
    fn emptied_specs_are_dropped() {
        let expression = TagExpression::parse("nope").unwrap();
        let specs = vec![spec(&[], vec![scenario("s1", &["smoke"])])];
        assert!(filter_specs_by_tags(specs, &expression).is_empty());
    }

    #[test]
    fn negation_drops_tagged_scenarios() {
        let expression = TagExpression::parse("smoke & !wip").unwrap();
        let specs = vec![spec(
            &[],
            vec![scenario("keep", &["smoke"]), scenario("drop", &["smoke", "wip"])],
        )];
        let filtered = filter_specs_by_tags(specs, &expression);
        assert_eq!(filtered[0].scenarios.len(), 1);
        assert_eq!(filtered[0].scenarios[0].heading, "keep");
    }

    #[test]
    fn index_filter_retains_a_single_scenario() {
        let mut s = spec(&[], vec![scenario("s0", &[]), scenario("s1", &[]), scenario("s2", &[])]);
        s.filter(&mut ScenarioIndexFilter::new(1));
        assert_eq!(s.scenarios.len(), 1);
        assert_eq!(s.scenarios[0].heading, "s1");
    }

    #[test]
    fn index_filter_out_of_range_drops_everything() {
        let mut s = spec(&[], vec![scenario("s0", &[])]);
        s.filter(&mut ScenarioIndexFilter::new(5));
        assert!(s.scenarios.is_empty());
    }
}
