//! Conversions from the domain tree to wire records.

use gauge_core::{Concept, Scenario, Specification, Step, StepValue, create_step_value};
use gauge_proto::{ConceptInfo, ProtoScenario, ProtoSpec, ProtoStep, ProtoStepValue};

pub fn to_proto_step_value(step_value: &StepValue) -> ProtoStepValue {
    ProtoStepValue {
        step_value: step_value.value.clone(),
        parameterized_step_value: step_value.parameterized.clone(),
        parameters: step_value.args.clone(),
    }
}

pub fn to_proto_step(step: &Step) -> ProtoStep {
    ProtoStep {
        text: step.text.clone(),
        is_concept: step.is_concept,
        has_inline_table: step.has_inline_table,
    }
}

pub fn to_proto_scenario(scenario: &Scenario) -> ProtoScenario {
    ProtoScenario {
        heading: scenario.heading.clone(),
        tags: scenario.tags.clone(),
        steps: scenario.steps.iter().map(to_proto_step).collect(),
    }
}

pub fn to_proto_spec(spec: &Specification) -> ProtoSpec {
    ProtoSpec {
        heading: spec.heading.clone(),
        file_name: spec.file_name.to_string_lossy().into_owned(),
        tags: spec.tags.clone(),
        contexts: spec.contexts.iter().map(to_proto_step).collect(),
        scenarios: spec.scenarios.iter().map(to_proto_scenario).collect(),
    }
}

pub fn to_concept_info(concept: &Concept) -> ConceptInfo {
    ConceptInfo {
        step_value: to_proto_step_value(&create_step_value(&concept.step)),
        file_path: concept.file_name.to_string_lossy().into_owned(),
        line_number: concept.step.line as u32,
    }
}
