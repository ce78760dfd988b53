use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// The network partition assigned to one stage.
///
/// Implementations are deterministic and side-effect free, but not safe for
/// concurrent invocation: the owning coordinator serializes calls.
pub trait ComputeUnit: Send {
    /// Maps one input tensor into this partition's output tensor.
    fn infer(&mut self, input: &[f32]) -> Vec<f32>;
}

/// Static description of a stage's partition, delivered with the node config.
///
/// Construction from a spec is cheap here, but the coordinator still treats it
/// as prohibitively expensive and builds the unit exactly once per process.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UnitSpec {
    pub in_len: usize,
    pub out_len: usize,
    #[serde(default)]
    pub seed: u64,
}

/// Builds the compute unit described by `spec`.
pub fn build(spec: &UnitSpec) -> Box<dyn ComputeUnit> {
    Box::new(Affine::new(spec))
}

/// Seeded affine layer with a relu, standing in for the real partition
/// numerics, which live outside this system.
struct Affine {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Affine {
    fn new(spec: &UnitSpec) -> Self {
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let weights = Array2::from_shape_fn((spec.out_len, spec.in_len), |_| {
            rng.random_range(-0.5f32..0.5)
        });
        let bias = Array1::from_shape_fn(spec.out_len, |_| rng.random_range(-0.5f32..0.5));

        Self { weights, bias }
    }
}

impl ComputeUnit for Affine {
    fn infer(&mut self, input: &[f32]) -> Vec<f32> {
        let x = ArrayView1::from(input);
        let y = self.weights.dot(&x) + &self.bias;
        y.mapv(|v| v.max(0.0)).to_vec()
    }
}
