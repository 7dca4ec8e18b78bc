//! Canonical operator-parameter data model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NumType {
    Half,
    Float,
}

impl NumType {
    pub fn default_size_bytes(self) -> u32 {
        match self {
            NumType::Half => 2,
            NumType::Float => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumType::Float)
    }
}

/// A per-dimension transform applied on the input, output, or kernel side
/// of a convolution. The same shape is reused for all three roles: for the
/// output side, `dilation` plays the role of stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DimTransform {
    pub truncation_lower: u64,
    pub truncation_upper: u64,
    pub dilation: u64,
    pub padding_lower: u64,
    pub padding_upper: u64,
    pub flip: bool,
}

impl DimTransform {
    pub fn identity() -> Self {
        Self {
            truncation_lower: 0,
            truncation_upper: 0,
            dilation: 1,
            padding_lower: 0,
            padding_upper: 0,
            flip: false,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.truncation_lower == 0
            && self.truncation_upper == 0
            && self.dilation <= 1
            && self.padding_lower == 0
            && self.padding_upper == 0
            && !self.flip
    }

    /// Canonical form: a zero dilation is meaningless and coerced to one; a
    /// flip flag on an already-symmetric identity transform has no
    /// observable effect and is cleared. Idempotent.
    fn canon(self) -> Self {
        let dilation = self.dilation.max(1);
        let flip = self.flip
            && (self.truncation_lower != 0
                || self.truncation_upper != 0
                || self.padding_lower != 0
                || self.padding_upper != 0
                || dilation != 1);
        Self {
            dilation,
            flip,
            ..self
        }
    }
}

/// Canonicalised convolution operator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvParams {
    pub input_type: NumType,
    pub output_type: NumType,
    pub batch_size: u64,
    pub num_conv_groups: u64,
    pub in_chans_per_group: u64,
    pub out_chans_per_group: u64,
    /// One entry per spatial (field) dimension.
    pub field_shape: Vec<u64>,
    pub kernel_shape: Vec<u64>,
    pub input_transform: Vec<DimTransform>,
    pub output_transform: Vec<DimTransform>,
    pub kernel_transform: Vec<DimTransform>,
}

impl ConvParams {
    pub fn num_field_dims(&self) -> usize {
        self.field_shape.len()
    }

    /// Output field size for dimension `dim`, given its transformed input
    /// and kernel size. Mirrors the standard conv output-size formula:
    /// `(paddedInput - paddedKernel) / outputStride + 1` with the output
    /// transform's truncation/padding applied afterwards.
    pub fn output_size(&self, dim: usize) -> u64 {
        let it = &self.input_transform[dim];
        let kt = &self.kernel_transform[dim];
        let ot = &self.output_transform[dim];

        let truncated_in = self.field_shape[dim]
            .saturating_sub(it.truncation_lower)
            .saturating_sub(it.truncation_upper);
        let dilated_in = if truncated_in == 0 {
            0
        } else {
            (truncated_in - 1) * it.dilation + 1
        };
        let padded_in = dilated_in + it.padding_lower + it.padding_upper;

        let truncated_k = self.kernel_shape[dim]
            .saturating_sub(kt.truncation_lower)
            .saturating_sub(kt.truncation_upper);
        let dilated_k = if truncated_k == 0 {
            0
        } else {
            (truncated_k - 1) * kt.dilation + 1
        };

        let convolved = if padded_in < dilated_k {
            0
        } else {
            (padded_in - dilated_k) / ot.dilation.max(1) + 1
        };

        convolved
            .saturating_sub(ot.truncation_lower)
            .saturating_sub(ot.truncation_upper)
            + ot.padding_lower
            + ot.padding_upper
    }

    /// Fold equivalent transform combinations into a normal form. Pure and
    /// idempotent.
    pub fn canonicalize(&self) -> Self {
        let mut p = self.clone();
        for t in p
            .input_transform
            .iter_mut()
            .chain(p.output_transform.iter_mut())
            .chain(p.kernel_transform.iter_mut())
        {
            *t = t.canon();
        }
        p.in_chans_per_group = p.in_chans_per_group.max(1);
        p.out_chans_per_group = p.out_chans_per_group.max(1);
        p.num_conv_groups = p.num_conv_groups.max(1);
        p.batch_size = p.batch_size.max(0);
        p
    }

    pub fn total_in_chans(&self) -> u64 {
        self.in_chans_per_group * self.num_conv_groups
    }

    pub fn total_out_chans(&self) -> u64 {
        self.out_chans_per_group * self.num_conv_groups
    }

    /// True if any logical dimension is degenerate.
    pub fn has_zero_dim(&self) -> bool {
        self.batch_size == 0
            || self.num_conv_groups == 0
            || self.in_chans_per_group == 0
            || self.out_chans_per_group == 0
            || self.field_shape.iter().any(|&s| s == 0)
            || self.kernel_shape.iter().any(|&s| s == 0)
            || (0..self.num_field_dims()).any(|d| self.output_size(d) == 0)
    }
}

/// Sparsity representation: uncompressed dense shape plus a ratio of
/// non-zero elements, used by the sparse-dense matmul planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SparsityParams {
    /// Fraction of elements that are non-zero, in `[0, 1]`.
    pub nz_ratio: f64,
    /// True if the sparsity pattern is block-structured rather than
    /// per-element (affects bucket grain only; not modelled further here).
    pub block_sparse: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatMulParams {
    pub input_type: NumType,
    pub num_groups: u64,
    pub in_chans: u64,
    pub out_chans: u64,
    pub batch_size: u64,
    pub sparsity: SparsityParams,
}

impl SparseMatMulParams {
    pub fn has_zero_dim(&self) -> bool {
        self.num_groups == 0 || self.in_chans == 0 || self.out_chans == 0 || self.batch_size == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtcParams {
    pub input_type: NumType,
    pub batch_size: u64,
    pub max_time: u64,
    pub max_label_length: u64,
    pub num_classes: u64,
}

impl CtcParams {
    pub fn has_zero_dim(&self) -> bool {
        self.batch_size == 0 || self.max_time == 0 || self.max_label_length == 0 || self.num_classes == 0
    }

    /// Extended-label length: `2 * maxLabelLength + 1` (alternating blanks).
    pub fn extended_label_length(&self) -> u64 {
        2 * self.max_label_length + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolKind {
    Max,
    Average,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParams {
    pub input_type: NumType,
    pub kind: PoolKind,
    pub batch_size: u64,
    pub channels: u64,
    pub field_shape: Vec<u64>,
    pub kernel_shape: Vec<u64>,
    pub stride: Vec<u64>,
}

impl PoolParams {
    pub fn has_zero_dim(&self) -> bool {
        self.batch_size == 0
            || self.channels == 0
            || self.field_shape.iter().any(|&s| s == 0)
            || self.kernel_shape.iter().any(|&s| s == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingOp {
    Slice,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    pub input_type: NumType,
    pub op: EmbeddingOp,
    pub num_entries: u64,
    pub embedding_size: u64,
    pub num_indices: u64,
}

impl EmbeddingParams {
    pub fn has_zero_dim(&self) -> bool {
        self.num_entries == 0 || self.embedding_size == 0 || self.num_indices == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_params() -> ConvParams {
        ConvParams {
            input_type: NumType::Half,
            output_type: NumType::Half,
            batch_size: 1,
            num_conv_groups: 1,
            in_chans_per_group: 16,
            out_chans_per_group: 16,
            field_shape: vec![4, 4],
            kernel_shape: vec![3, 3],
            input_transform: vec![DimTransform::identity(); 2],
            output_transform: vec![DimTransform::identity(); 2],
            kernel_transform: vec![DimTransform::identity(); 2],
        }
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let p = simple_params();
        let once = p.canonicalize();
        let twice = once.canonicalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn output_size_matches_standard_formula() {
        let p = simple_params();
        // field=4, kernel=3, no padding, stride 1 -> 4-3+1 = 2
        assert_eq!(p.output_size(0), 2);
        assert_eq!(p.output_size(1), 2);
    }

    #[test]
    fn zero_sized_field_is_detected() {
        let mut p = simple_params();
        p.field_shape[0] = 0;
        assert!(p.has_zero_dim());
    }
}
