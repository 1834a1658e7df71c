use ndarray::Array4;

use crate::catalog::Disease;
use crate::error::DetectError;

/// A trained model treated as a black box: one forward pass over a
/// preprocessed batch of one, returning the raw score per class.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, DetectError>;
}

/// Arg-max over the model output.
///
/// Returns the winning class, its confidence clamped into `[0, 1]`, and
/// whether another class scored exactly as high.
pub fn top_prediction(scores: &[f32]) -> Result<(Disease, f32, bool), DetectError> {
    if scores.len() != Disease::CLASSES.len() {
        return Err(DetectError::Inference(format!(
            "expected {} scores, model returned {}",
            Disease::CLASSES.len(),
            scores.len()
        )));
    }

    let (index, &best) = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| DetectError::Inference("empty model output".to_string()))?;

    if !best.is_finite() {
        return Err(DetectError::Inference(format!(
            "non-finite score {} in model output",
            best
        )));
    }

    let tied = scores.iter().filter(|&&s| s == best).count() > 1;
    let disease = Disease::from_index(index)
        .ok_or_else(|| DetectError::Inference(format!("no class for index {}", index)))?;

    Ok((disease, best.clamp(0.0, 1.0), tied))
}

#[cfg(feature = "tensorflow")]
pub use self::tf::Model;

#[cfg(feature = "tensorflow")]
mod tf {
    use std::fs::File;
    use std::io::Read;

    use ndarray::Array4;
    use tensorflow::{
        Graph, ImportGraphDefOptions, Operation, Session, SessionOptions, SessionRunArgs, Tensor,
    };

    use super::Classifier;
    use crate::error::DetectError;

    /// Frozen TensorFlow graph with resolved input and output operations.
    pub struct Model {
        session: Session,
        input: Operation,
        output: Operation,
    }

    impl Model {
        pub fn new(
            model_path: &str,
            input_op: &str,
            output_op: &str,
        ) -> Result<Self, Box<dyn std::error::Error>> {
            let mut graph = Graph::new();
            let mut model_file = File::open(model_path)?;
            let mut model_bytes = Vec::new();
            model_file.read_to_end(&mut model_bytes)?;

            graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

            let session = Session::new(&SessionOptions::new(), &graph)?;

            let input = graph
                .operation_by_name(input_op)?
                .ok_or_else(|| format!("input operation '{}' not found in graph", input_op))?;
            let output = graph
                .operation_by_name(output_op)?
                .ok_or_else(|| format!("output operation '{}' not found in graph", output_op))?;

            Ok(Model {
                session,
                input,
                output,
            })
        }
    }

    impl Classifier for Model {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, DetectError> {
            let dims: Vec<u64> = input.shape().iter().map(|&d| d as u64).collect();
            let values: Vec<f32> = input.iter().copied().collect();
            let input_tensor = Tensor::new(&dims)
                .with_values(&values)
                .map_err(|e| DetectError::Inference(e.to_string()))?;

            let mut args = SessionRunArgs::new();
            args.add_feed(&self.input, 0, &input_tensor);
            let output_token = args.request_fetch(&self.output, 0);

            self.session
                .run(&mut args)
                .map_err(|e| DetectError::Inference(e.to_string()))?;

            let output_tensor: Tensor<f32> = args
                .fetch(output_token)
                .map_err(|e| DetectError::Inference(e.to_string()))?;

            Ok(output_tensor.to_vec())
        }
    }
}
