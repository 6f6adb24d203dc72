//! Inference entrypoint
//!
//! Runs `parse -> encode -> predict -> decode` for one declared input and
//! turns any per-call failure, including a panic inside a backend, into the
//! fallback parameters. Exactly one [`Emission`] results from each call.

use crate::error::{PredictorError, Result};
use crate::input::{InferenceInput, ParsedInput};
use crate::models::{DecodedParameters, FeatureVector, ParameterSet};
use crate::observability::StructuredLogger;
use crate::predictor::{FeatureEncoder, ParameterDecoder, Predictor};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

/// Pipeline stage, named in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseInput,
    Encode,
    Predict,
    Decode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ParseInput => "parse_input",
            Stage::Encode => "encode",
            Stage::Predict => "predict",
            Stage::Decode => "decode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline failure and the stage it happened in
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: PredictorError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

/// Result of one invocation: the stdout line plus every row for `--out`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    parameter_set: ParameterSet,
    /// Parameters printed to stdout (the first row, or the fallback)
    pub values: Vec<u8>,
    /// Parameters for every input row; empty on fallback
    pub rows: Vec<Vec<u8>>,
    pub fallback: bool,
    /// Stage that failed or panicked, when `fallback` is set
    pub failed_stage: Option<Stage>,
}

impl Emission {
    fn predicted(parameter_set: ParameterSet, decoded: &[DecodedParameters]) -> Self {
        let rows: Vec<Vec<u8>> = decoded.iter().map(DecodedParameters::values).collect();
        Self {
            parameter_set,
            values: rows.first().cloned().unwrap_or_else(|| parameter_set.fallback()),
            rows,
            fallback: false,
            failed_stage: None,
        }
    }

    pub fn fallback(parameter_set: ParameterSet) -> Self {
        Self {
            parameter_set,
            values: parameter_set.fallback(),
            rows: Vec::new(),
            fallback: true,
            failed_stage: None,
        }
    }

    fn failed_at(parameter_set: ParameterSet, stage: Stage) -> Self {
        Self {
            failed_stage: Some(stage),
            ..Self::fallback(parameter_set)
        }
    }

    pub fn parameter_set(&self) -> ParameterSet {
        self.parameter_set
    }

    /// Compact JSON array, e.g. `[1,0,2,3]`
    pub fn line(&self) -> String {
        let items: Vec<String> = self.values.iter().map(u8::to_string).collect();
        format!("[{}]", items.join(","))
    }

    /// Write every row as CSV under a header of parameter names
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.parameter_set.names())?;
        let fallback = [self.values.clone()];
        let rows: &[Vec<u8>] = if self.fallback { &fallback } else { &self.rows };
        for row in rows {
            writer.write_record(row.iter().map(u8::to_string))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Drives one predictor through the full pipeline
pub struct InferenceEntrypoint<'a> {
    predictor: &'a dyn Predictor,
    encoder: FeatureEncoder,
    decoder: ParameterDecoder,
    logger: StructuredLogger,
}

impl<'a> InferenceEntrypoint<'a> {
    /// Pair a loaded predictor with the parameter set it was trained for
    pub fn new(predictor: &'a dyn Predictor, parameter_set: ParameterSet) -> Result<Self> {
        if predictor.output_dim() != parameter_set.arity() {
            return Err(PredictorError::artifact(
                predictor.backend(),
                format!(
                    "backend produces {} outputs, the {} parameter set has {}",
                    predictor.output_dim(),
                    parameter_set,
                    parameter_set.arity()
                ),
            ));
        }
        Ok(Self {
            predictor,
            encoder: FeatureEncoder::new(),
            decoder: ParameterDecoder::new(parameter_set),
            logger: StructuredLogger::new(predictor.backend()),
        })
    }

    pub fn parameter_set(&self) -> ParameterSet {
        self.decoder.parameter_set()
    }

    /// Run every stage, stopping at the first failure
    pub fn infer(
        &self,
        input: &InferenceInput,
    ) -> std::result::Result<Vec<DecodedParameters>, StageError> {
        self.infer_tracked(input, &Cell::new(Stage::ParseInput))
    }

    /// `current` names the stage in progress, so a panic can be attributed
    fn infer_tracked(
        &self,
        input: &InferenceInput,
        current: &Cell<Stage>,
    ) -> std::result::Result<Vec<DecodedParameters>, StageError> {
        current.set(Stage::ParseInput);
        let parsed = input.parse().at(Stage::ParseInput)?;
        current.set(Stage::Encode);
        let vectors = self.encode(parsed).at(Stage::Encode)?;
        let mut decoded = Vec::with_capacity(vectors.len());
        for features in &vectors {
            current.set(Stage::Predict);
            let raw = self.predictor.predict(features).at(Stage::Predict)?;
            current.set(Stage::Decode);
            decoded.push(self.decoder.decode(&raw).at(Stage::Decode)?);
        }
        Ok(decoded)
    }

    fn encode(&self, parsed: ParsedInput) -> Result<Vec<FeatureVector>> {
        match parsed {
            ParsedInput::Record(record) => {
                let features = self.encoder.encode(&record);
                self.logger.log_encoded(features.len());
                Ok(vec![features])
            }
            ParsedInput::Rows(rows) => Ok(rows),
        }
    }

    /// Run the pipeline; never fails and never panics
    pub fn run(&self, input: &InferenceInput) -> Emission {
        let start = Instant::now();
        let parameter_set = self.parameter_set();
        let current = Cell::new(Stage::ParseInput);
        match catch_unwind(AssertUnwindSafe(|| self.infer_tracked(input, &current))) {
            Ok(Ok(decoded)) => {
                let emission = Emission::predicted(parameter_set, &decoded);
                self.logger.log_prediction(
                    &emission.values,
                    emission.rows.len(),
                    start.elapsed().as_micros(),
                );
                emission
            }
            Ok(Err(err)) => {
                let emission = Emission::failed_at(parameter_set, err.stage);
                self.logger
                    .log_fallback(err.stage.as_str(), &err.to_string(), &emission.values);
                emission
            }
            Err(payload) => {
                let stage = current.get();
                let emission = Emission::failed_at(parameter_set, stage);
                let reason = format!("panic: {}", panic_message(payload.as_ref()));
                self.logger
                    .log_fallback(stage.as_str(), &reason, &emission.values);
                emission
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
