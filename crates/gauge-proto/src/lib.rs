//! gauge-proto - Wire protocol for the gauge API service and language runners
//!
//! Two message families share one envelope shape and one codec:
//!
//! - [`ApiMessage`] - spoken between the API service and IDE/editor plugins
//!   over TCP: the requests behind autocomplete, refactoring, formatting.
//! - [`RunnerMessage`] - spoken between the host and a language runner
//!   subprocess: step discovery, spec execution, shutdown.
//!
//! An envelope is `{ message_type, message_id, body }`; the type
//! discriminates the body, and responses echo the request's id. Message
//! types the peer does not know decode into an `Unknown` payload with the
//! raw body preserved, so old hosts and new plugins can coexist; the
//! service answers those with the dedicated unsupported response rather
//! than a protocol error.
//!
//! On the stream, every message is framed as a uvarint byte length followed
//! by the encoded envelope (see [`framing`]). The encoding itself is a
//! tagged-record format described in [`wire`].

pub mod framing;
pub mod wire;

use wire::{WireDecode, WireEncode, WireError, WireReader, WireWriter};

// ============================================================================
// Shared payload records
// ============================================================================

/// A canonical step signature as sent to editors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoStepValue {
    pub step_value: String,
    pub parameterized_step_value: String,
    pub parameters: Vec<String>,
}

impl WireEncode for ProtoStepValue {
    fn encode(&self, w: &mut WireWriter) {
        w.string(1, &self.step_value);
        w.string(2, &self.parameterized_step_value);
        w.strings(3, &self.parameters);
    }
}

impl WireDecode for ProtoStepValue {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ProtoStepValue::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.step_value = r.string(field)?,
                2 => out.parameterized_step_value = r.string(field)?,
                3 => out.parameters.push(r.string(field)?),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoStep {
    pub text: String,
    pub is_concept: bool,
    pub has_inline_table: bool,
}

impl WireEncode for ProtoStep {
    fn encode(&self, w: &mut WireWriter) {
        w.string(1, &self.text);
        w.bool(2, self.is_concept);
        w.bool(3, self.has_inline_table);
    }
}

impl WireDecode for ProtoStep {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ProtoStep::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.text = r.string(field)?,
                2 => out.is_concept = r.bool()?,
                3 => out.has_inline_table = r.bool()?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoScenario {
    pub heading: String,
    pub tags: Vec<String>,
    pub steps: Vec<ProtoStep>,
}

impl WireEncode for ProtoScenario {
    fn encode(&self, w: &mut WireWriter) {
        w.string(1, &self.heading);
        w.strings(2, &self.tags);
        w.messages(3, &self.steps);
    }
}

impl WireDecode for ProtoScenario {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ProtoScenario::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.heading = r.string(field)?,
                2 => out.tags.push(r.string(field)?),
                3 => out.steps.push(r.message()?),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

/// An encoded specification, contexts and scenarios included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoSpec {
    pub heading: String,
    pub file_name: String,
    pub tags: Vec<String>,
    pub contexts: Vec<ProtoStep>,
    pub scenarios: Vec<ProtoScenario>,
}

impl WireEncode for ProtoSpec {
    fn encode(&self, w: &mut WireWriter) {
        w.string(1, &self.heading);
        w.string(2, &self.file_name);
        w.strings(3, &self.tags);
        w.messages(4, &self.contexts);
        w.messages(5, &self.scenarios);
    }
}

impl WireDecode for ProtoSpec {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ProtoSpec::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.heading = r.string(field)?,
                2 => out.file_name = r.string(field)?,
                3 => out.tags.push(r.string(field)?),
                4 => out.contexts.push(r.message()?),
                5 => out.scenarios.push(r.message()?),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

/// A concept definition's location, served to editors for navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptInfo {
    pub step_value: ProtoStepValue,
    pub file_path: String,
    pub line_number: u32,
}

impl WireEncode for ConceptInfo {
    fn encode(&self, w: &mut WireWriter) {
        w.message(1, &self.step_value);
        w.string(2, &self.file_path);
        w.uint(3, u64::from(self.line_number));
    }
}

impl WireDecode for ConceptInfo {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ConceptInfo::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.step_value = r.message()?,
                2 => out.file_path = r.string(field)?,
                3 => out.line_number = r.uint()? as u32,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

/// Outcome of one spec's execution inside a runner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoSpecResult {
    pub spec_heading: String,
    pub file_name: String,
    pub failed: bool,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
}

impl WireEncode for ProtoSpecResult {
    fn encode(&self, w: &mut WireWriter) {
        w.string(1, &self.spec_heading);
        w.string(2, &self.file_name);
        w.bool(3, self.failed);
        w.uint(4, self.execution_time_ms);
        if let Some(message) = &self.error_message {
            w.string(5, message);
        }
    }
}

impl WireDecode for ProtoSpecResult {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ProtoSpecResult::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.spec_heading = r.string(field)?,
                2 => out.file_name = r.string(field)?,
                3 => out.failed = r.bool()?,
                4 => out.execution_time_ms = r.uint()?,
                5 => out.error_message = Some(r.string(field)?),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

/// A failed before-suite or after-suite hook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoHookFailure {
    pub message: String,
    pub stack_trace: String,
}

impl WireEncode for ProtoHookFailure {
    fn encode(&self, w: &mut WireWriter) {
        w.string(1, &self.message);
        w.string(2, &self.stack_trace);
    }
}

impl WireDecode for ProtoHookFailure {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut out = ProtoHookFailure::default();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => out.message = r.string(field)?,
                2 => out.stack_trace = r.string(field)?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(out)
    }
}

// ============================================================================
// API envelope
// ============================================================================

/// One message on an API connection.
///
/// `message_id` is caller-supplied on requests and echoed on responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiMessage {
    pub message_id: i64,
    pub payload: ApiPayload,
}

/// The API request/response bodies, discriminated by the wire
/// `message_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    GetProjectRootRequest,
    GetProjectRootResponse {
        project_root: String,
    },
    GetInstallationRootRequest,
    GetInstallationRootResponse {
        installation_root: String,
    },
    GetAllStepsRequest,
    GetAllStepsResponse {
        steps: Vec<ProtoStepValue>,
    },
    GetAllSpecsRequest,
    GetAllSpecsResponse {
        specs: Vec<ProtoSpec>,
    },
    GetStepValueRequest {
        step_text: String,
        has_inline_table: bool,
    },
    GetStepValueResponse {
        step_value: ProtoStepValue,
    },
    GetLanguagePluginLibPathRequest {
        language: String,
    },
    GetLanguagePluginLibPathResponse {
        path: String,
    },
    GetAllConceptsRequest,
    GetAllConceptsResponse {
        concepts: Vec<ConceptInfo>,
    },
    PerformRefactoringRequest {
        old_step: String,
        new_step: String,
    },
    PerformRefactoringResponse {
        success: bool,
        errors: Vec<String>,
        files_changed: Vec<String>,
    },
    ExtractConceptRequest {
        concept_name: String,
        concept_file_name: String,
        spec_file_name: String,
        begin_line: u32,
        end_line: u32,
    },
    ExtractConceptResponse {
        success: bool,
        error: Option<String>,
        files_changed: Vec<String>,
    },
    FormatSpecsRequest {
        specs: Vec<String>,
    },
    FormatSpecsResponse {
        warnings: Vec<String>,
        errors: Vec<String>,
    },
    ErrorResponse {
        error: String,
    },
    UnsupportedApiMessageResponse,
    /// A message type this build does not know. The body is preserved
    /// verbatim so the envelope re-encodes losslessly.
    Unknown {
        message_type: u64,
        body: Vec<u8>,
    },
}

impl ApiPayload {
    /// The wire discriminant of this payload.
    pub fn message_type(&self) -> u64 {
        use ApiPayload::*;
        match self {
            GetProjectRootRequest => 0,
            GetProjectRootResponse { .. } => 1,
            GetInstallationRootRequest => 2,
            GetInstallationRootResponse { .. } => 3,
            GetAllStepsRequest => 4,
            GetAllStepsResponse { .. } => 5,
            GetAllSpecsRequest => 6,
            GetAllSpecsResponse { .. } => 7,
            GetStepValueRequest { .. } => 8,
            GetStepValueResponse { .. } => 9,
            GetLanguagePluginLibPathRequest { .. } => 10,
            GetLanguagePluginLibPathResponse { .. } => 11,
            GetAllConceptsRequest => 12,
            GetAllConceptsResponse { .. } => 13,
            PerformRefactoringRequest { .. } => 14,
            PerformRefactoringResponse { .. } => 15,
            ExtractConceptRequest { .. } => 16,
            ExtractConceptResponse { .. } => 17,
            FormatSpecsRequest { .. } => 18,
            FormatSpecsResponse { .. } => 19,
            ErrorResponse { .. } => 20,
            UnsupportedApiMessageResponse => 21,
            Unknown { message_type, .. } => *message_type,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        use ApiPayload::*;
        let mut w = WireWriter::new();
        match self {
            GetProjectRootRequest
            | GetInstallationRootRequest
            | GetAllStepsRequest
            | GetAllSpecsRequest
            | GetAllConceptsRequest
            | UnsupportedApiMessageResponse => {}
            GetProjectRootResponse { project_root } => w.string(1, project_root),
            GetInstallationRootResponse { installation_root } => w.string(1, installation_root),
            GetAllStepsResponse { steps } => w.messages(1, steps),
            GetAllSpecsResponse { specs } => w.messages(1, specs),
            GetStepValueRequest {
                step_text,
                has_inline_table,
            } => {
                w.string(1, step_text);
                w.bool(2, *has_inline_table);
            }
            GetStepValueResponse { step_value } => w.message(1, step_value),
            GetLanguagePluginLibPathRequest { language } => w.string(1, language),
            GetLanguagePluginLibPathResponse { path } => w.string(1, path),
            GetAllConceptsResponse { concepts } => w.messages(1, concepts),
            PerformRefactoringRequest { old_step, new_step } => {
                w.string(1, old_step);
                w.string(2, new_step);
            }
            PerformRefactoringResponse {
                success,
                errors,
                files_changed,
            } => {
                w.bool(1, *success);
                w.strings(2, errors);
                w.strings(3, files_changed);
            }
            ExtractConceptRequest {
                concept_name,
                concept_file_name,
                spec_file_name,
                begin_line,
                end_line,
            } => {
                w.string(1, concept_name);
                w.string(2, concept_file_name);
                w.string(3, spec_file_name);
                w.uint(4, u64::from(*begin_line));
                w.uint(5, u64::from(*end_line));
            }
            ExtractConceptResponse {
                success,
                error,
                files_changed,
            } => {
                w.bool(1, *success);
                if let Some(error) = error {
                    w.string(2, error);
                }
                w.strings(3, files_changed);
            }
            FormatSpecsRequest { specs } => w.strings(1, specs),
            FormatSpecsResponse { warnings, errors } => {
                w.strings(1, warnings);
                w.strings(2, errors);
            }
            ErrorResponse { error } => w.string(1, error),
            Unknown { body, .. } => return body.clone(),
        }
        w.into_bytes()
    }

    fn decode_body(message_type: u64, body: &[u8]) -> Result<Self, WireError> {
        use ApiPayload::*;
        let r = &mut WireReader::new(body);
        let payload = match message_type {
            0 => GetProjectRootRequest,
            1 => GetProjectRootResponse {
                project_root: decode_single_string(r)?,
            },
            2 => GetInstallationRootRequest,
            3 => GetInstallationRootResponse {
                installation_root: decode_single_string(r)?,
            },
            4 => GetAllStepsRequest,
            5 => {
                let mut steps = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => steps.push(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                GetAllStepsResponse { steps }
            }
            6 => GetAllSpecsRequest,
            7 => {
                let mut specs = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => specs.push(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                GetAllSpecsResponse { specs }
            }
            8 => {
                let mut step_text = String::new();
                let mut has_inline_table = false;
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => step_text = r.string(field)?,
                        2 => has_inline_table = r.bool()?,
                        _ => r.skip(wire_type)?,
                    }
                }
                GetStepValueRequest {
                    step_text,
                    has_inline_table,
                }
            }
            9 => {
                let mut step_value = None;
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => step_value = Some(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                GetStepValueResponse {
                    step_value: step_value
                        .ok_or(WireError::MissingField("GetStepValueResponse", 1))?,
                }
            }
            10 => GetLanguagePluginLibPathRequest {
                language: decode_single_string(r)?,
            },
            11 => GetLanguagePluginLibPathResponse {
                path: decode_single_string(r)?,
            },
            12 => GetAllConceptsRequest,
            13 => {
                let mut concepts = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => concepts.push(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                GetAllConceptsResponse { concepts }
            }
            14 => {
                let mut old_step = String::new();
                let mut new_step = String::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => old_step = r.string(field)?,
                        2 => new_step = r.string(field)?,
                        _ => r.skip(wire_type)?,
                    }
                }
                PerformRefactoringRequest { old_step, new_step }
            }
            15 => {
                let mut success = false;
                let mut errors = Vec::new();
                let mut files_changed = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => success = r.bool()?,
                        2 => errors.push(r.string(field)?),
                        3 => files_changed.push(r.string(field)?),
                        _ => r.skip(wire_type)?,
                    }
                }
                PerformRefactoringResponse {
                    success,
                    errors,
                    files_changed,
                }
            }
            16 => {
                let mut concept_name = String::new();
                let mut concept_file_name = String::new();
                let mut spec_file_name = String::new();
                let mut begin_line = 0;
                let mut end_line = 0;
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => concept_name = r.string(field)?,
                        2 => concept_file_name = r.string(field)?,
                        3 => spec_file_name = r.string(field)?,
                        4 => begin_line = r.uint()? as u32,
                        5 => end_line = r.uint()? as u32,
                        _ => r.skip(wire_type)?,
                    }
                }
                ExtractConceptRequest {
                    concept_name,
                    concept_file_name,
                    spec_file_name,
                    begin_line,
                    end_line,
                }
            }
            17 => {
                let mut success = false;
                let mut error = None;
                let mut files_changed = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => success = r.bool()?,
                        2 => error = Some(r.string(field)?),
                        3 => files_changed.push(r.string(field)?),
                        _ => r.skip(wire_type)?,
                    }
                }
                ExtractConceptResponse {
                    success,
                    error,
                    files_changed,
                }
            }
            18 => {
                let mut specs = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => specs.push(r.string(field)?),
                        _ => r.skip(wire_type)?,
                    }
                }
                FormatSpecsRequest { specs }
            }
            19 => {
                let mut warnings = Vec::new();
                let mut errors = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => warnings.push(r.string(field)?),
                        2 => errors.push(r.string(field)?),
                        _ => r.skip(wire_type)?,
                    }
                }
                FormatSpecsResponse { warnings, errors }
            }
            20 => ErrorResponse {
                error: decode_single_string(r)?,
            },
            21 => UnsupportedApiMessageResponse,
            other => Unknown {
                message_type: other,
                body: body.to_vec(),
            },
        };
        Ok(payload)
    }
}

/// Decode a body whose only known field is string field 1.
fn decode_single_string(r: &mut WireReader<'_>) -> Result<String, WireError> {
    let mut value = String::new();
    while let Some((field, wire_type)) = r.next_field()? {
        match field {
            1 => value = r.string(field)?,
            _ => r.skip(wire_type)?,
        }
    }
    Ok(value)
}

impl WireEncode for ApiMessage {
    fn encode(&self, w: &mut WireWriter) {
        w.uint(1, self.payload.message_type());
        w.int(2, self.message_id);
        w.bytes(3, &self.payload.encode_body());
    }
}

impl WireDecode for ApiMessage {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut message_type = None;
        let mut message_id = 0;
        let mut body: Vec<u8> = Vec::new();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message_type = Some(r.uint()?),
                2 => message_id = r.int()?,
                3 => body = r.bytes()?.to_vec(),
                _ => r.skip(wire_type)?,
            }
        }
        let message_type = message_type.ok_or(WireError::MissingField("ApiMessage", 1))?;
        Ok(ApiMessage {
            message_id,
            payload: ApiPayload::decode_body(message_type, &body)?,
        })
    }
}

// ============================================================================
// Runner envelope
// ============================================================================

/// One message on the host ↔ runner connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerMessage {
    pub message_id: i64,
    pub payload: RunnerPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunnerPayload {
    /// Ask the runner for the step texts it implements.
    StepNamesRequest,
    StepNamesResponse {
        steps: Vec<String>,
    },
    /// Run one spec, scenarios in order, and report the outcome.
    ExecuteSpecRequest {
        spec: ProtoSpec,
    },
    SpecExecutionResponse {
        result: ProtoSpecResult,
    },
    /// Suite lifecycle: the runner fires its before-suite hooks.
    SuiteExecutionBeginRequest,
    /// Suite lifecycle: the runner fires its after-suite hooks.
    SuiteExecutionEndRequest,
    SuiteHookResponse {
        hook_failure: Option<ProtoHookFailure>,
    },
    /// Final message; the runner exits on receipt.
    KillProcessRequest,
    Unknown {
        message_type: u64,
        body: Vec<u8>,
    },
}

impl RunnerPayload {
    pub fn message_type(&self) -> u64 {
        use RunnerPayload::*;
        match self {
            StepNamesRequest => 0,
            StepNamesResponse { .. } => 1,
            ExecuteSpecRequest { .. } => 2,
            SpecExecutionResponse { .. } => 3,
            SuiteExecutionBeginRequest => 4,
            SuiteExecutionEndRequest => 5,
            SuiteHookResponse { .. } => 6,
            KillProcessRequest => 7,
            Unknown { message_type, .. } => *message_type,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        use RunnerPayload::*;
        let mut w = WireWriter::new();
        match self {
            StepNamesRequest | SuiteExecutionBeginRequest | SuiteExecutionEndRequest
            | KillProcessRequest => {}
            StepNamesResponse { steps } => w.strings(1, steps),
            ExecuteSpecRequest { spec } => w.message(1, spec),
            SpecExecutionResponse { result } => w.message(1, result),
            SuiteHookResponse { hook_failure } => {
                if let Some(failure) = hook_failure {
                    w.message(1, failure);
                }
            }
            Unknown { body, .. } => return body.clone(),
        }
        w.into_bytes()
    }

    fn decode_body(message_type: u64, body: &[u8]) -> Result<Self, WireError> {
        use RunnerPayload::*;
        let r = &mut WireReader::new(body);
        let payload = match message_type {
            0 => StepNamesRequest,
            1 => {
                let mut steps = Vec::new();
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => steps.push(r.string(field)?),
                        _ => r.skip(wire_type)?,
                    }
                }
                StepNamesResponse { steps }
            }
            2 => {
                let mut spec = None;
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => spec = Some(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                ExecuteSpecRequest {
                    spec: spec.ok_or(WireError::MissingField("ExecuteSpecRequest", 1))?,
                }
            }
            3 => {
                let mut result = None;
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => result = Some(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                SpecExecutionResponse {
                    result: result.ok_or(WireError::MissingField("SpecExecutionResponse", 1))?,
                }
            }
            4 => SuiteExecutionBeginRequest,
            5 => SuiteExecutionEndRequest,
            6 => {
                let mut hook_failure = None;
                while let Some((field, wire_type)) = r.next_field()? {
                    match field {
                        1 => hook_failure = Some(r.message()?),
                        _ => r.skip(wire_type)?,
                    }
                }
                SuiteHookResponse { hook_failure }
            }
            7 => KillProcessRequest,
            other => Unknown {
                message_type: other,
                body: body.to_vec(),
            },
        };
        Ok(payload)
    }
}

impl WireEncode for RunnerMessage {
    fn encode(&self, w: &mut WireWriter) {
        w.uint(1, self.payload.message_type());
        w.int(2, self.message_id);
        w.bytes(3, &self.payload.encode_body());
    }
}

impl WireDecode for RunnerMessage {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        let mut message_type = None;
        let mut message_id = 0;
        let mut body: Vec<u8> = Vec::new();
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message_type = Some(r.uint()?),
                2 => message_id = r.int()?,
                3 => body = r.bytes()?.to_vec(),
                _ => r.skip(wire_type)?,
            }
        }
        let message_type = message_type.ok_or(WireError::MissingField("RunnerMessage", 1))?;
        Ok(RunnerMessage {
            message_id,
            payload: RunnerPayload::decode_body(message_type, &body)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_api(message: ApiMessage) {
        let bytes = message.encode_to_vec();
        let decoded = ApiMessage::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    fn round_trip_runner(message: RunnerMessage) {
        let bytes = message.encode_to_vec();
        let decoded = RunnerMessage::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn api_requests_round_trip() {
        round_trip_api(ApiMessage {
            message_id: 1,
            payload: ApiPayload::GetProjectRootRequest,
        });
        round_trip_api(ApiMessage {
            message_id: -7,
            payload: ApiPayload::GetStepValueRequest {
                step_text: "login as \"sue\"".into(),
                has_inline_table: true,
            },
        });
        round_trip_api(ApiMessage {
            message_id: i64::MAX,
            payload: ApiPayload::PerformRefactoringRequest {
                old_step: "old".into(),
                new_step: "new".into(),
            },
        });
    }

    #[test]
    fn nested_spec_response_round_trips() {
        let spec = ProtoSpec {
            heading: "Login".into(),
            file_name: "specs/login.spec".into(),
            tags: vec!["smoke".into(), "login".into()],
            contexts: vec![ProtoStep {
                text: "open the app".into(),
                ..Default::default()
            }],
            scenarios: vec![ProtoScenario {
                heading: "valid user".into(),
                tags: vec!["fast".into()],
                steps: vec![
                    ProtoStep {
                        text: "login as {}".into(),
                        is_concept: true,
                        has_inline_table: false,
                    },
                    ProtoStep {
                        text: "create users {}".into(),
                        is_concept: false,
                        has_inline_table: true,
                    },
                ],
            }],
        };
        round_trip_api(ApiMessage {
            message_id: 12,
            payload: ApiPayload::GetAllSpecsResponse {
                specs: vec![spec.clone(), ProtoSpec::default()],
            },
        });
    }

    #[test]
    fn optional_fields_round_trip_both_ways() {
        round_trip_api(ApiMessage {
            message_id: 3,
            payload: ApiPayload::ExtractConceptResponse {
                success: false,
                error: Some("no selection".into()),
                files_changed: vec![],
            },
        });
        round_trip_api(ApiMessage {
            message_id: 4,
            payload: ApiPayload::ExtractConceptResponse {
                success: true,
                error: None,
                files_changed: vec!["specs/login.spec".into(), "concepts/auth.cpt".into()],
            },
        });
    }

    #[test]
    fn unknown_message_types_survive_decode_and_reencode() {
        let original = ApiMessage {
            message_id: 99,
            payload: ApiPayload::Unknown {
                message_type: 4242,
                body: vec![0x0a, 0x03, b'f', b'o', b'o'],
            },
        };
        let bytes = original.encode_to_vec();
        let decoded = ApiMessage::decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.payload.message_type(), 4242);
    }

    #[test]
    fn runner_messages_round_trip() {
        round_trip_runner(RunnerMessage {
            message_id: 0,
            payload: RunnerPayload::StepNamesResponse {
                steps: vec!["login as {}".into(), "see the dashboard".into()],
            },
        });
        round_trip_runner(RunnerMessage {
            message_id: 5,
            payload: RunnerPayload::SpecExecutionResponse {
                result: ProtoSpecResult {
                    spec_heading: "Login".into(),
                    file_name: "specs/login.spec".into(),
                    failed: true,
                    execution_time_ms: 1234,
                    error_message: Some("step failed".into()),
                },
            },
        });
        round_trip_runner(RunnerMessage {
            message_id: 6,
            payload: RunnerPayload::SuiteHookResponse {
                hook_failure: Some(ProtoHookFailure {
                    message: "before-suite panicked".into(),
                    stack_trace: "at hooks.js:10".into(),
                }),
            },
        });
        round_trip_runner(RunnerMessage {
            message_id: 7,
            payload: RunnerPayload::SuiteHookResponse { hook_failure: None },
        });
    }

    #[test]
    fn envelope_without_message_type_is_rejected() {
        let mut w = WireWriter::new();
        w.int(2, 5);
        let err = ApiMessage::decode_from_slice(&w.into_bytes()).unwrap_err();
        assert_eq!(err, WireError::MissingField("ApiMessage", 1));
    }
}
