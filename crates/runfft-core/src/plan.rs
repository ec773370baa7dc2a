//! Plan tree construction.
//!
//! A plan decomposes one validated descriptor into a tree of compute nodes
//! (arena-indexed, no cycles) plus a flat, in-order list of [`PlanStep`]s,
//! one per kernel launch, that the scheduler turns into launch records.
//! Kernel specs and twiddle tables are interned so nodes with identical
//! parameters share one entry.
//!
//! Step shape conventions (consumed by the scheduler and any harness):
//! - `Stockham`: `lengths[0]` is the transform length, `lengths[1..]` are
//!   higher iteration dims; stride arrays are parallel with the batch
//!   distance appended last. An optional large-twiddle table multiplies
//!   output element `k` of row `r` by `table[k*cols + r mod cols]`.
//! - `Transpose`: `lengths` are input-view dims (row-major, fastest last);
//!   element `(i0, .., c)` with `c` the fastest dim is written to
//!   `sum(idx[d]*strides_out[d])`, which encodes the permutation.
//! - `RealTwistForward`/`RealTwistInverse`: `lengths[0]` is the
//!   half-spectrum length; the step converts between a packed complex
//!   half-length spectrum and the Hermitian half-spectrum.
//! - `Single2D`: `lengths = [len_fast, len_slow]`; both axes run
//!   back-to-back through LDS in one launch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::{ArrayLayout, FftDescriptor, Placement, TransformKind};
use crate::error::FftError;
use crate::kernels::{
    self, EmbeddedKind, KernelId, KernelSpec, RealTwistSpec, StockhamSpec, TransposeSpec,
    TRANSPOSE_TILE,
};
use crate::twiddle::{TwiddleArena, TwiddleId};

/// Decomposition scheme of one plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Stockham1D,
    BlockComputeC2C,
    BlockComputeR2C,
    BlockComputeC2R,
    Transpose,
    RealPre,
    RealPost,
    L1dCc,
    L1dTrtrt,
    Rtrt2D,
    Single2D,
    Trtrtr3D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// One node of the plan tree. The arena owns all nodes; children are
/// indices, so the structure is strictly a tree.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub scheme: Scheme,
    pub length: Vec<usize>,
    pub children: Vec<NodeId>,
    pub kernel: Option<KernelId>,
    pub twiddle: Option<TwiddleId>,
    pub large_twiddle: Option<TwiddleId>,
    pub scratch_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Stockham,
    Transpose,
    RealTwistForward,
    RealTwistInverse,
    Single2D,
}

/// One kernel launch in traversal order, with resolved iteration shapes.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub node: NodeId,
    pub kind: StepKind,
    pub kernel: KernelId,
    pub twiddles: Option<TwiddleId>,
    /// Second-axis table for fused 2-D kernels.
    pub twiddles2: Option<TwiddleId>,
    pub large_twiddles: Option<TwiddleId>,
    pub lengths: Vec<usize>,
    /// Element strides parallel to `lengths`, batch distance appended.
    pub strides_in: Vec<usize>,
    pub strides_out: Vec<usize>,
    /// Complex elements one batch of this step's output occupies, for
    /// scratch sizing.
    pub elements_out: usize,
}

/// A compiled plan: the node tree, interned kernels and twiddles, and the
/// flat step list. Immutable once built; safe to share across threads.
#[derive(Debug)]
pub struct Plan {
    pub desc: FftDescriptor,
    pub nodes: Vec<PlanNode>,
    pub root: NodeId,
    pub kernels: Vec<KernelSpec>,
    pub twiddles: TwiddleArena,
    pub steps: Vec<PlanStep>,
    pub schedule: Vec<crate::schedule::LaunchRecord>,
    pub scratch_bytes: usize,
}

impl Plan {
    /// Build a plan for a validated descriptor (the `plan_create` entry
    /// point of the library ABI).
    pub fn new(desc: FftDescriptor) -> Result<Plan, FftError> {
        let mut builder = PlanBuilder::new(desc);
        let root = builder.build()?;
        crate::schedule::finalize(builder, root)
    }

    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id.0]
    }

    pub fn kernel(&self, id: KernelId) -> &KernelSpec {
        &self.kernels[id.0]
    }

    /// Scratch bytes the caller must provide to `plan_execute`.
    pub fn scratch_bytes(&self) -> usize {
        self.scratch_bytes
    }

    /// Leaf nodes in execution order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.steps.iter().map(|s| s.node).collect()
    }
}

pub(crate) struct PlanBuilder {
    pub desc: FftDescriptor,
    pub nodes: Vec<PlanNode>,
    pub kernels: Vec<KernelSpec>,
    pub kernel_index: HashMap<KernelSpec, KernelId>,
    pub twiddles: TwiddleArena,
    pub steps: Vec<PlanStep>,
}

/// Stride/distance pair describing one side of a 1-D subproblem.
#[derive(Debug, Clone, Copy)]
struct Edge1D {
    stride: usize,
    dist: usize,
}

impl PlanBuilder {
    fn new(desc: FftDescriptor) -> Self {
        Self {
            desc,
            nodes: Vec::new(),
            kernels: Vec::new(),
            kernel_index: HashMap::new(),
            twiddles: TwiddleArena::new(),
            steps: Vec::new(),
        }
    }

    fn node(&mut self, scheme: Scheme, length: Vec<usize>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PlanNode {
            scheme,
            length,
            children: Vec::new(),
            kernel: None,
            twiddle: None,
            large_twiddle: None,
            scratch_bytes: 0,
        });
        id
    }

    fn intern_kernel(&mut self, spec: KernelSpec) -> KernelId {
        if let Some(id) = self.kernel_index.get(&spec) {
            return *id;
        }
        let id = KernelId(self.kernels.len());
        self.kernels.push(spec.clone());
        self.kernel_index.insert(spec, id);
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn push_step(
        &mut self,
        node: NodeId,
        kind: StepKind,
        kernel: KernelId,
        twiddles: Option<TwiddleId>,
        twiddles2: Option<TwiddleId>,
        large_twiddles: Option<TwiddleId>,
        lengths: Vec<usize>,
        strides_in: Vec<usize>,
        strides_out: Vec<usize>,
        elements_out: usize,
    ) {
        debug_assert_eq!(strides_in.len(), lengths.len() + 1);
        debug_assert_eq!(strides_out.len(), lengths.len() + 1);
        self.nodes[node.0].kernel = Some(kernel);
        self.nodes[node.0].twiddle = twiddles.or(self.nodes[node.0].twiddle);
        self.nodes[node.0].large_twiddle = large_twiddles.or(self.nodes[node.0].large_twiddle);
        self.steps.push(PlanStep {
            node,
            kind,
            kernel,
            twiddles,
            twiddles2,
            large_twiddles,
            lengths,
            strides_in,
            strides_out,
            elements_out,
        });
    }

    fn transpose_kernel(&mut self) -> KernelId {
        self.intern_kernel(KernelSpec::Transpose(TransposeSpec {
            precision: self.desc.precision,
            tile: TRANSPOSE_TILE,
        }))
    }

    fn build(&mut self) -> Result<NodeId, FftError> {
        log::debug!("planning transform: {}", self.desc);
        if self.desc.transform.is_real() {
            self.build_real()
        } else {
            match self.desc.rank() {
                1 => self.build_c2c_1d_root(),
                2 => self.build_c2c_2d(),
                _ => self.build_c2c_3d(),
            }
        }
    }

    // ---------------------------------------------------------------
    // 1-D complex
    // ---------------------------------------------------------------

    fn build_c2c_1d_root(&mut self) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let length = desc.length[0];
        self.build_c2c_1d(
            length,
            Edge1D {
                stride: desc.istride[0],
                dist: desc.idist,
            },
            Edge1D {
                stride: desc.ostride[0],
                dist: desc.odist,
            },
            desc.input_layout,
            desc.output_layout,
            desc.placement,
            EmbeddedKind::None,
        )
    }

    /// Plan one 1-D complex transform between the given edges. Also used
    /// for the half-length complex stage of real transforms, in which case
    /// `embedded` carries the fused twist.
    #[allow(clippy::too_many_arguments)]
    fn build_c2c_1d(
        &mut self,
        length: usize,
        in_edge: Edge1D,
        out_edge: Edge1D,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        placement: Placement,
        embedded: EmbeddedKind,
    ) -> Result<NodeId, FftError> {
        if kernels::fits_single_kernel(length) {
            return self.stockham_leaf_1d(
                length, in_edge, out_edge, in_layout, out_layout, placement, embedded,
            );
        }
        if embedded != EmbeddedKind::None {
            // Fused real processing is only available on single-kernel
            // lengths; callers fall back to a standalone twist first.
            return Err(FftError::unsupported_length(length));
        }

        let cc = find_cc_split(length);
        let trtrt = find_balanced_split(length);
        match (cc, trtrt) {
            (Some(split), None) => {
                self.build_l1d_cc(length, split, in_edge, out_edge, in_layout, out_layout)
            }
            (Some(split), Some(_)) if prefer_cc(cc, trtrt) => {
                self.build_l1d_cc(length, split, in_edge, out_edge, in_layout, out_layout)
            }
            (_, Some(split)) => {
                self.build_l1d_trtrt(length, split, in_edge, out_edge, in_layout, out_layout)
            }
            (None, None) => Err(FftError::unsupported_length(length)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn stockham_leaf_1d(
        &mut self,
        length: usize,
        in_edge: Edge1D,
        out_edge: Edge1D,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        placement: Placement,
        embedded: EmbeddedKind,
    ) -> Result<NodeId, FftError> {
        let direction = self.desc.direction();
        let precision = self.desc.precision;
        let spec = StockhamSpec::derive_row(
            length, precision, placement, in_layout, out_layout, direction, embedded,
        )?;
        let factors = spec.factors.clone();
        let node = self.node(Scheme::Stockham1D, vec![length]);
        let kernel = self.intern_kernel(KernelSpec::Stockham(spec));
        let tw = self.twiddles.intern_pass(
            length,
            &factors,
            direction,
            precision,
            embedded != EmbeddedKind::None,
        );
        let elements_out = match embedded {
            EmbeddedKind::RealPre => length + 1,
            _ => length,
        };
        self.push_step(
            node,
            StepKind::Stockham,
            kernel,
            Some(tw),
            None,
            None,
            vec![length],
            vec![in_edge.stride, in_edge.dist],
            vec![out_edge.stride, out_edge.dist],
            elements_out,
        );
        Ok(node)
    }

    /// L1D_CC: a column-block kernel over the `l1` rows folds the outer
    /// roots in via the large table, then a row kernel finishes the `l2`
    /// columns writing strided output. Two launches, one scratch buffer.
    #[allow(clippy::too_many_arguments)]
    fn build_l1d_cc(
        &mut self,
        length: usize,
        (l1, l2): (usize, usize),
        in_edge: Edge1D,
        out_edge: Edge1D,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
    ) -> Result<NodeId, FftError> {
        let direction = self.desc.direction();
        let precision = self.desc.precision;
        let root = self.node(Scheme::L1dCc, vec![length]);

        let col_spec = StockhamSpec::derive_column_block(
            l1,
            precision,
            in_layout,
            ArrayLayout::ComplexInterleaved,
            direction,
        )?;
        let col_factors = col_spec.factors.clone();
        let col_node = self.node(Scheme::BlockComputeC2C, vec![l1]);
        let col_kernel = self.intern_kernel(KernelSpec::Stockham(col_spec));
        let col_tw = self
            .twiddles
            .intern_pass(l1, &col_factors, direction, precision, false);
        let large = self.twiddles.intern_large(l1, l2, direction, precision);
        self.push_step(
            col_node,
            StepKind::Stockham,
            col_kernel,
            Some(col_tw),
            None,
            Some(large),
            vec![l1, l2],
            vec![l2 * in_edge.stride, in_edge.stride, in_edge.dist],
            vec![l2, 1, length],
            length,
        );

        let row_spec = StockhamSpec::derive_row(
            l2,
            precision,
            Placement::OutOfPlace,
            ArrayLayout::ComplexInterleaved,
            out_layout,
            direction,
            EmbeddedKind::None,
        )?;
        let row_factors = row_spec.factors.clone();
        let row_node = self.node(Scheme::Stockham1D, vec![l2]);
        let row_kernel = self.intern_kernel(KernelSpec::Stockham(row_spec));
        let row_tw = self
            .twiddles
            .intern_pass(l2, &row_factors, direction, precision, false);
        self.push_step(
            row_node,
            StepKind::Stockham,
            row_kernel,
            Some(row_tw),
            None,
            None,
            vec![l2, l1],
            vec![1, l2, length],
            vec![l1 * out_edge.stride, out_edge.stride, out_edge.dist],
            length,
        );

        self.nodes[root.0].children = vec![col_node, row_node];
        self.nodes[root.0].large_twiddle = Some(large);
        Ok(root)
    }

    /// L1D_TRTRT: transpose / row transform (with the outer roots folded
    /// in) / transpose / row transform / transpose.
    #[allow(clippy::too_many_arguments)]
    fn build_l1d_trtrt(
        &mut self,
        length: usize,
        (l1, l2): (usize, usize),
        in_edge: Edge1D,
        out_edge: Edge1D,
        _in_layout: ArrayLayout,
        _out_layout: ArrayLayout,
    ) -> Result<NodeId, FftError> {
        let direction = self.desc.direction();
        let precision = self.desc.precision;
        let root = self.node(Scheme::L1dTrtrt, vec![length]);
        let tkernel = self.transpose_kernel();
        let large = self.twiddles.intern_large(l1, l2, direction, precision);
        let mut children = Vec::with_capacity(5);

        // T: [l1][l2] strided input -> [l2][l1] scratch.
        let t1 = self.node(Scheme::Transpose, vec![l1, l2]);
        self.push_step(
            t1,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![l1, l2],
            vec![l2 * in_edge.stride, in_edge.stride, in_edge.dist],
            vec![1, l1, length],
            length,
        );
        children.push(t1);

        // S(l1) on contiguous rows, folding in the outer roots.
        let mut s1_spec = StockhamSpec::derive_row(
            l1,
            precision,
            Placement::OutOfPlace,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            direction,
            EmbeddedKind::None,
        )?;
        s1_spec.large_twiddle = true;
        let s1_factors = s1_spec.factors.clone();
        let s1 = self.node(Scheme::Stockham1D, vec![l1]);
        let s1_kernel = self.intern_kernel(KernelSpec::Stockham(s1_spec));
        let s1_tw = self
            .twiddles
            .intern_pass(l1, &s1_factors, direction, precision, false);
        self.push_step(
            s1,
            StepKind::Stockham,
            s1_kernel,
            Some(s1_tw),
            None,
            Some(large),
            vec![l1, l2],
            vec![1, l1, length],
            vec![1, l1, length],
            length,
        );
        children.push(s1);

        // T: [l2][l1] -> [l1][l2].
        let t2 = self.node(Scheme::Transpose, vec![l2, l1]);
        self.push_step(
            t2,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![l2, l1],
            vec![l1, 1, length],
            vec![1, l2, length],
            length,
        );
        children.push(t2);

        // S(l2) on contiguous rows.
        let s2_spec = StockhamSpec::derive_row(
            l2,
            precision,
            Placement::OutOfPlace,
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            direction,
            EmbeddedKind::None,
        )?;
        let s2_factors = s2_spec.factors.clone();
        let s2 = self.node(Scheme::Stockham1D, vec![l2]);
        let s2_kernel = self.intern_kernel(KernelSpec::Stockham(s2_spec));
        let s2_tw = self
            .twiddles
            .intern_pass(l2, &s2_factors, direction, precision, false);
        self.push_step(
            s2,
            StepKind::Stockham,
            s2_kernel,
            Some(s2_tw),
            None,
            None,
            vec![l2, l1],
            vec![1, l2, length],
            vec![1, l2, length],
            length,
        );
        children.push(s2);

        // T: [l1][l2] -> strided output, placing X[k1 + l1*k2].
        let t3 = self.node(Scheme::Transpose, vec![l1, l2]);
        self.push_step(
            t3,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![l1, l2],
            vec![l2, 1, length],
            vec![out_edge.stride, l1 * out_edge.stride, out_edge.dist],
            length,
        );
        children.push(t3);

        self.nodes[root.0].children = children;
        self.nodes[root.0].large_twiddle = Some(large);
        Ok(root)
    }

    // ---------------------------------------------------------------
    // 2-D / 3-D complex
    // ---------------------------------------------------------------

    fn build_c2c_2d(&mut self) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let (l0, l1) = (desc.length[0], desc.length[1]);
        if kernels::fits_single_2d(l0, l1) {
            return self.build_2d_single(l0, l1);
        }
        let total = l0 * l1;
        for axis in [l1, l0] {
            if !kernels::fits_single_kernel(axis) {
                return Err(FftError::unsupported_length(axis));
            }
        }

        let root = self.node(Scheme::Rtrt2D, vec![l0, l1]);
        let tkernel = self.transpose_kernel();
        let mut children = Vec::with_capacity(4);

        // Rows along the contiguous axis.
        let s1 = self.stockham_rows(
            l1,
            vec![l1, l0],
            vec![desc.istride[1], desc.istride[0], desc.idist],
            vec![1, l1, total],
            desc.input_layout,
            ArrayLayout::ComplexInterleaved,
            total,
        )?;
        children.push(s1);

        // T: [l0][l1] -> [l1][l0].
        let t1 = self.node(Scheme::Transpose, vec![l0, l1]);
        self.push_step(
            t1,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![l0, l1],
            vec![l1, 1, total],
            vec![1, l0, total],
            total,
        );
        children.push(t1);

        // Former columns, now contiguous rows.
        let s2 = self.stockham_rows(
            l0,
            vec![l0, l1],
            vec![1, l0, total],
            vec![1, l0, total],
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            total,
        )?;
        children.push(s2);

        // T back to [l0][l1], writing user output.
        let t2 = self.node(Scheme::Transpose, vec![l1, l0]);
        self.push_step(
            t2,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![l1, l0],
            vec![l0, 1, total],
            vec![desc.ostride[1], desc.ostride[0], desc.odist],
            total,
        );
        children.push(t2);

        self.nodes[root.0].children = children;
        Ok(root)
    }

    fn build_2d_single(&mut self, l0: usize, l1: usize) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let direction = desc.direction();
        let precision = desc.precision;
        let spec = StockhamSpec::derive_single_2d(
            l0,
            l1,
            precision,
            desc.placement,
            desc.input_layout,
            desc.output_layout,
            direction,
        )?;
        let (f1, f0) = (spec.factors.clone(), spec.factors2.clone());
        let node = self.node(Scheme::Single2D, vec![l0, l1]);
        let kernel = self.intern_kernel(KernelSpec::Stockham(spec));
        let tw1 = self.twiddles.intern_pass(l1, &f1, direction, precision, false);
        let tw0 = self.twiddles.intern_pass(l0, &f0, direction, precision, false);
        self.push_step(
            node,
            StepKind::Single2D,
            kernel,
            Some(tw1),
            Some(tw0),
            None,
            vec![l1, l0],
            vec![desc.istride[1], desc.istride[0], desc.idist],
            vec![desc.ostride[1], desc.ostride[0], desc.odist],
            l0 * l1,
        );
        Ok(node)
    }

    fn build_c2c_3d(&mut self) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let (l0, l1, l2) = (desc.length[0], desc.length[1], desc.length[2]);
        for axis in [l2, l1, l0] {
            if !kernels::fits_single_kernel(axis) {
                return Err(FftError::unsupported_length(axis));
            }
        }
        let total = l0 * l1 * l2;
        let root = self.node(Scheme::Trtrtr3D, vec![l0, l1, l2]);
        let tkernel = self.transpose_kernel();
        let mut children = Vec::with_capacity(6);

        // S(l2) along the contiguous axis, from user input.
        let s1 = self.stockham_rows(
            l2,
            vec![l2, l1, l0],
            vec![desc.istride[2], desc.istride[1], desc.istride[0], desc.idist],
            vec![1, l2, l1 * l2, total],
            desc.input_layout,
            ArrayLayout::ComplexInterleaved,
            total,
        )?;
        children.push(s1);

        // Rotate [l0][l1][l2] -> [l2][l0][l1].
        children.push(self.rotate_step(tkernel, l0 * l1, l2, total));

        // S(l1), now contiguous.
        let s2 = self.stockham_rows(
            l1,
            vec![l1, l0, l2],
            vec![1, l1, l0 * l1, total],
            vec![1, l1, l0 * l1, total],
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            total,
        )?;
        children.push(s2);

        // Rotate [l2][l0][l1] -> [l1][l2][l0].
        children.push(self.rotate_step(tkernel, l2 * l0, l1, total));

        // S(l0), now contiguous.
        let s3 = self.stockham_rows(
            l0,
            vec![l0, l2, l1],
            vec![1, l0, l2 * l0, total],
            vec![1, l0, l2 * l0, total],
            ArrayLayout::ComplexInterleaved,
            ArrayLayout::ComplexInterleaved,
            total,
        )?;
        children.push(s3);

        // Final rotate [l1][l2][l0] -> [l0][l1][l2], writing user output.
        let t3 = self.node(Scheme::Transpose, vec![l1, l2, l0]);
        self.push_step(
            t3,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![l1, l2, l0],
            vec![l2 * l0, l0, 1, total],
            vec![desc.ostride[1], desc.ostride[2], desc.ostride[0], desc.odist],
            total,
        );
        children.push(t3);

        self.nodes[root.0].children = children;
        Ok(root)
    }

    /// Contiguous-rotation transpose `[rows][cols] -> [cols][rows]` between
    /// scratch buffers, rows possibly a fused product of higher dims.
    fn rotate_step(&mut self, tkernel: KernelId, rows: usize, cols: usize, total: usize) -> NodeId {
        let node = self.node(Scheme::Transpose, vec![rows, cols]);
        self.push_step(
            node,
            StepKind::Transpose,
            tkernel,
            None,
            None,
            None,
            vec![rows, cols],
            vec![cols, 1, total],
            vec![1, rows, total],
            total,
        );
        node
    }

    /// A plain batched row-transform leaf with explicit shapes.
    #[allow(clippy::too_many_arguments)]
    fn stockham_rows(
        &mut self,
        length: usize,
        lengths: Vec<usize>,
        strides_in: Vec<usize>,
        strides_out: Vec<usize>,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        elements_out: usize,
    ) -> Result<NodeId, FftError> {
        let direction = self.desc.direction();
        let precision = self.desc.precision;
        let spec = StockhamSpec::derive_row(
            length,
            precision,
            Placement::OutOfPlace,
            in_layout,
            out_layout,
            direction,
            EmbeddedKind::None,
        )?;
        let factors = spec.factors.clone();
        let node = self.node(Scheme::Stockham1D, vec![length]);
        let kernel = self.intern_kernel(KernelSpec::Stockham(spec));
        let tw = self
            .twiddles
            .intern_pass(length, &factors, direction, precision, false);
        self.push_step(
            node,
            StepKind::Stockham,
            kernel,
            Some(tw),
            None,
            None,
            lengths,
            strides_in,
            strides_out,
            elements_out,
        );
        Ok(node)
    }

    // ---------------------------------------------------------------
    // Real transforms
    // ---------------------------------------------------------------

    fn build_real(&mut self) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let rank = desc.rank();
        let last = desc.length[rank - 1];
        if last % 2 != 0 {
            set_real_diag("odd-length real transforms are not supported");
            return Err(FftError::unsupported_length(last));
        }
        let half = last / 2;

        // The packed complex view of the real side needs unit stride on
        // the contiguous axis and even strides above it.
        let (real_strides, real_dist) = match desc.transform {
            TransformKind::RealForward => (&desc.istride, desc.idist),
            _ => (&desc.ostride, desc.odist),
        };
        if real_strides[rank - 1] != 1 {
            return Err(FftError::invalid_config(
                "real transforms require unit stride on the contiguous axis",
            ));
        }
        if real_strides[..rank - 1].iter().any(|s| s % 2 != 0) || real_dist % 2 != 0 {
            return Err(FftError::invalid_config(
                "real transform strides above the contiguous axis must be even",
            ));
        }

        if rank == 1 {
            self.build_real_1d(half)
        } else {
            if !kernels::fits_single_kernel(half) {
                return Err(FftError::unsupported_length(2 * half));
            }
            self.build_real_multi(half)
        }
    }

    fn build_real_1d(&mut self, half: usize) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let forward = desc.transform == TransformKind::RealForward;

        if kernels::fits_single_kernel(half) {
            // Fused twist: a single kernel handles the packed complex
            // transform and the Hermitian conversion.
            let (in_edge, out_edge) = if forward {
                (
                    Edge1D { stride: 1, dist: desc.idist / 2 },
                    Edge1D { stride: desc.ostride[0], dist: desc.odist },
                )
            } else {
                (
                    Edge1D { stride: desc.istride[0], dist: desc.idist },
                    Edge1D { stride: 1, dist: desc.odist / 2 },
                )
            };
            return self.stockham_leaf_1d(
                half,
                in_edge,
                out_edge,
                desc.input_layout,
                desc.output_layout,
                desc.placement,
                if forward { EmbeddedKind::RealPre } else { EmbeddedKind::RealPost },
            );
        }

        // Large half-length: standalone twist around a complex subplan.
        let scheme = if forward { Scheme::RealPre } else { Scheme::RealPost };
        let root = self.node(scheme, vec![2 * half]);
        let twist_tw = self
            .twiddles
            .intern_real_factors(half, desc.direction(), desc.precision);
        let twist_kernel = self.intern_kernel(KernelSpec::RealTwist(RealTwistSpec {
            half_length: half,
            precision: desc.precision,
            direction: desc.direction(),
        }));

        let mut children = Vec::new();
        if forward {
            let sub = self.build_c2c_1d(
                half,
                Edge1D { stride: 1, dist: desc.idist / 2 },
                Edge1D { stride: 1, dist: half },
                desc.input_layout,
                ArrayLayout::ComplexInterleaved,
                Placement::OutOfPlace,
                EmbeddedKind::None,
            )?;
            children.push(sub);
            let twist = self.node(Scheme::RealPre, vec![2 * half]);
            self.push_step(
                twist,
                StepKind::RealTwistForward,
                twist_kernel,
                Some(twist_tw),
                None,
                None,
                vec![half],
                vec![1, half],
                vec![desc.ostride[0], desc.odist],
                half + 1,
            );
            children.push(twist);
        } else {
            let twist = self.node(Scheme::RealPost, vec![2 * half]);
            self.push_step(
                twist,
                StepKind::RealTwistInverse,
                twist_kernel,
                Some(twist_tw),
                None,
                None,
                vec![half],
                vec![desc.istride[0], desc.idist],
                vec![1, half],
                half,
            );
            children.push(twist);
            let sub = self.build_c2c_1d(
                half,
                Edge1D { stride: 1, dist: half },
                Edge1D { stride: 1, dist: desc.odist / 2 },
                ArrayLayout::ComplexInterleaved,
                desc.output_layout,
                Placement::OutOfPlace,
                EmbeddedKind::None,
            )?;
            children.push(sub);
        }
        self.nodes[root.0].children = children;
        Ok(root)
    }

    /// Rank 2/3 real transforms: the contiguous axis runs the fused real
    /// kernel; the remaining axes are complex transforms over the
    /// Hermitian-width data, interleaved with rotations.
    fn build_real_multi(&mut self, half: usize) -> Result<NodeId, FftError> {
        let desc = self.desc.clone();
        let rank = desc.rank();
        let forward = desc.transform == TransformKind::RealForward;
        let h = half + 1;
        let scheme = if forward { Scheme::RealPre } else { Scheme::RealPost };
        let root = self.node(scheme, desc.length.clone());
        let tkernel = self.transpose_kernel();
        let mut children = Vec::new();

        if forward {
            // Fused real kernel along the contiguous axis.
            let (lengths, strides_in, strides_out, total) = if rank == 2 {
                let l0 = desc.length[0];
                (
                    vec![half, l0],
                    vec![1, desc.istride[0] / 2, desc.idist / 2],
                    vec![1, h, h * l0],
                    h * l0,
                )
            } else {
                let (l0, l1) = (desc.length[0], desc.length[1]);
                (
                    vec![half, l1, l0],
                    vec![1, desc.istride[1] / 2, desc.istride[0] / 2, desc.idist / 2],
                    vec![1, h, h * l1, h * l1 * l0],
                    h * l1 * l0,
                )
            };
            let real_leaf = self.real_embedded_leaf(
                half,
                desc.input_layout,
                ArrayLayout::ComplexInterleaved,
                EmbeddedKind::RealPre,
                lengths,
                strides_in,
                strides_out,
                total,
            )?;
            children.push(real_leaf);

            // Remaining axes: rotate + contiguous row transform.
            let higher: Vec<usize> = desc.length[..rank - 1].to_vec();
            let total = h * higher.iter().product::<usize>();
            // Current layout: [l0](, [l1])[h].
            let mut dims: Vec<usize> = higher.clone();
            dims.push(h);
            for _ in 0..higher.len() {
                let cols = *dims.last().unwrap();
                let rows: usize = dims[..dims.len() - 1].iter().product();
                children.push(self.rotate_step(tkernel, rows, cols, total));
                dims.rotate_right(1);
                let axis = *dims.last().unwrap();
                let s = self.stockham_rows(
                    axis,
                    vec![axis, total / axis],
                    vec![1, axis, total],
                    vec![1, axis, total],
                    ArrayLayout::ComplexInterleaved,
                    ArrayLayout::ComplexInterleaved,
                    total,
                )?;
                children.push(s);
            }
            // One more rotation returns to [l0](, [l1])[h], writing the
            // user's Hermitian output.
            let t = self.node(Scheme::Transpose, dims.clone());
            let (lengths, strides_in, strides_out) = if rank == 2 {
                // dims = [h, l0]; element (hh, l0) lands at user (l0, hh).
                (
                    vec![dims[0], dims[1]],
                    vec![dims[1], 1, total],
                    vec![desc.ostride[1], desc.ostride[0], desc.odist],
                )
            } else {
                // dims = [l1, h, l0]; element (l1, hh, l0) lands at user
                // (l0, l1, hh).
                (
                    dims.clone(),
                    vec![dims[1] * dims[2], dims[2], 1, total],
                    vec![desc.ostride[1], desc.ostride[2], desc.ostride[0], desc.odist],
                )
            };
            self.push_step(
                t,
                StepKind::Transpose,
                tkernel,
                None,
                None,
                None,
                lengths,
                strides_in,
                strides_out,
                total,
            );
            children.push(t);
        } else {
            // Inverse: higher axes first (in reverse), then the fused
            // real-inverse kernel along the contiguous axis.
            let higher: Vec<usize> = desc.length[..rank - 1].to_vec();
            let total = h * higher.iter().product::<usize>();

            // First rotation reads the user's Hermitian input.
            let t0 = self.node(Scheme::Transpose, desc.length.clone());
            if rank == 2 {
                let l0 = desc.length[0];
                self.push_step(
                    t0,
                    StepKind::Transpose,
                    tkernel,
                    None,
                    None,
                    None,
                    vec![l0, h],
                    vec![desc.istride[0], desc.istride[1], desc.idist],
                    vec![1, l0, total],
                    total,
                );
            } else {
                let (l0, l1) = (desc.length[0], desc.length[1]);
                // [l0][l1][h] -> [l1][h][l0]
                self.push_step(
                    t0,
                    StepKind::Transpose,
                    tkernel,
                    None,
                    None,
                    None,
                    vec![l0, l1, h],
                    vec![desc.istride[0], desc.istride[1], desc.istride[2], desc.idist],
                    vec![1, h * l0, l0, total],
                    total,
                );
            }
            children.push(t0);

            // Transform each higher axis, rotating the leading dim to the
            // back after each pass until the Hermitian axis is contiguous
            // again.
            let mut dims: Vec<usize> = higher.clone();
            dims.push(h);
            // After t0 the fastest dim is the first higher axis.
            dims.rotate_left(1);
            for _ in 0..higher.len() {
                let axis = *dims.last().unwrap();
                let s = self.stockham_rows(
                    axis,
                    vec![axis, total / axis],
                    vec![1, axis, total],
                    vec![1, axis, total],
                    ArrayLayout::ComplexInterleaved,
                    ArrayLayout::ComplexInterleaved,
                    total,
                )?;
                children.push(s);
                let front = dims[0];
                children.push(self.rotate_step(tkernel, front, total / front, total));
                dims.rotate_left(1);
            }
            debug_assert_eq!(*dims.last().unwrap(), h);

            // Fused real-inverse kernel writing the packed real output.
            let (lengths, strides_in, strides_out) = if rank == 2 {
                let l0 = desc.length[0];
                (
                    vec![half, l0],
                    vec![1, h, total],
                    vec![1, desc.ostride[0] / 2, desc.odist / 2],
                )
            } else {
                let (l0, l1) = (desc.length[0], desc.length[1]);
                (
                    vec![half, l1, l0],
                    vec![1, h, h * l1, total],
                    vec![1, desc.ostride[1] / 2, desc.ostride[0] / 2, desc.odist / 2],
                )
            };
            let real_leaf = self.real_embedded_leaf(
                half,
                ArrayLayout::ComplexInterleaved,
                desc.output_layout,
                EmbeddedKind::RealPost,
                lengths,
                strides_in,
                strides_out,
                desc.length.iter().product::<usize>(),
            )?;
            children.push(real_leaf);
        }

        self.nodes[root.0].children = children;
        Ok(root)
    }

    /// A Stockham leaf with a fused real twist and explicit shapes.
    #[allow(clippy::too_many_arguments)]
    fn real_embedded_leaf(
        &mut self,
        half: usize,
        in_layout: ArrayLayout,
        out_layout: ArrayLayout,
        embedded: EmbeddedKind,
        lengths: Vec<usize>,
        strides_in: Vec<usize>,
        strides_out: Vec<usize>,
        elements_out: usize,
    ) -> Result<NodeId, FftError> {
        let direction = self.desc.direction();
        let precision = self.desc.precision;
        let spec = StockhamSpec::derive_row(
            half,
            precision,
            Placement::OutOfPlace,
            in_layout,
            out_layout,
            direction,
            embedded,
        )?;
        let factors = spec.factors.clone();
        let node = self.node(Scheme::Stockham1D, vec![half]);
        let kernel = self.intern_kernel(KernelSpec::Stockham(spec));
        let tw = self
            .twiddles
            .intern_pass(half, &factors, direction, precision, true);
        self.push_step(
            node,
            StepKind::Stockham,
            kernel,
            Some(tw),
            None,
            None,
            lengths,
            strides_in,
            strides_out,
            elements_out,
        );
        Ok(node)
    }
}

fn set_real_diag(msg: &str) {
    crate::error::set_last_diagnostic(msg);
}

/// Largest tuned column-block length dividing `length` whose cofactor
/// still fits a single kernel.
fn find_cc_split(length: usize) -> Option<(usize, usize)> {
    kernels::block_cc_lengths()
        .find(|&l1| length % l1 == 0 && kernels::fits_single_kernel(length / l1))
        .map(|l1| (l1, length / l1))
}

/// Near-square split with both halves single-kernel sized.
fn find_balanced_split(length: usize) -> Option<(usize, usize)> {
    let sqrt = (length as f64).sqrt() as usize;
    for l1 in (2..=sqrt.min(2048)).rev() {
        if length % l1 == 0
            && kernels::fits_single_kernel(l1)
            && kernels::fits_single_kernel(length / l1)
        {
            return Some((l1, length / l1));
        }
    }
    for l1 in (sqrt + 1)..=2048.min(length / 2) {
        if length % l1 == 0
            && kernels::fits_single_kernel(l1)
            && kernels::fits_single_kernel(length / l1)
        {
            return Some((l1, length / l1));
        }
    }
    None
}

/// Tie-break between L1D_CC and L1D_TRTRT: minimize estimated
/// scratch-buffer count times kernel count; ties prefer CC.
fn prefer_cc(cc: Option<(usize, usize)>, trtrt: Option<(usize, usize)>) -> bool {
    match (cc, trtrt) {
        (Some(_), None) => true,
        (None, _) => false,
        (Some(_), Some(_)) => {
            let cc_cost = 2; // two kernels times one scratch buffer
            let trtrt_cost = 10; // five kernels times two scratch buffers
            cc_cost <= trtrt_cost
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FftRequest, Precision};

    fn plan_c2c(length: Vec<usize>, precision: Precision, in_place: bool) -> Plan {
        Plan::new(
            FftRequest {
                length,
                precision,
                placement: if in_place {
                    Placement::InPlace
                } else {
                    Placement::OutOfPlace
                },
                ..Default::default()
            }
            .normalize()
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn length_64_is_a_single_stockham_leaf() {
        let plan = plan_c2c(vec![64], Precision::F32, true);
        assert_eq!(plan.nodes.len(), 1);
        assert_eq!(plan.node(plan.root).scheme, Scheme::Stockham1D);
        assert_eq!(plan.steps.len(), 1);
        let KernelSpec::Stockham(spec) = plan.kernel(plan.steps[0].kernel) else {
            panic!("expected a stockham kernel");
        };
        assert_eq!(spec.factors, vec![4, 4, 4]);
        let tw = plan.steps[0].twiddles.unwrap();
        assert_eq!(plan.twiddles.table(tw).len(), 63);
    }

    #[test]
    fn length_4096_uses_two_level_cc_plan() {
        let plan = plan_c2c(vec![4096], Precision::F32, true);
        assert_eq!(plan.node(plan.root).scheme, Scheme::L1dCc);
        assert_eq!(plan.node(plan.root).children.len(), 2);
        let schemes: Vec<Scheme> = plan
            .node(plan.root)
            .children
            .iter()
            .map(|c| plan.node(*c).scheme)
            .collect();
        assert_eq!(schemes, vec![Scheme::BlockComputeC2C, Scheme::Stockham1D]);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.scratch_bytes() > 0);
        let large = plan.node(plan.root).large_twiddle.unwrap();
        assert_eq!(plan.twiddles.table(large).len(), 4096);
    }

    #[test]
    fn rank3_uses_trtrtr_with_six_leaves() {
        let plan = plan_c2c(vec![192, 84, 84], Precision::F32, false);
        assert_eq!(plan.node(plan.root).scheme, Scheme::Trtrtr3D);
        assert_eq!(plan.node(plan.root).children.len(), 6);
        assert_eq!(plan.steps.len(), 6);
        let kinds: Vec<StepKind> = plan.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Stockham,
                StepKind::Transpose,
                StepKind::Stockham,
                StepKind::Transpose,
                StepKind::Stockham,
                StepKind::Transpose,
            ]
        );
    }

    #[test]
    fn length_35_factors_greedily() {
        let plan = plan_c2c(vec![35], Precision::F64, true);
        assert_eq!(plan.steps.len(), 1);
        let KernelSpec::Stockham(spec) = plan.kernel(plan.steps[0].kernel) else {
            panic!("expected a stockham kernel");
        };
        assert_eq!(spec.factors, vec![7, 5]);
        assert_eq!(spec.length / spec.threads_per_transform, 5);
    }

    #[test]
    fn real_forward_8_embeds_the_twist() {
        let plan = Plan::new(
            FftRequest {
                length: vec![8],
                batch: 3,
                transform: TransformKind::RealForward,
                placement: Placement::InPlace,
                ..Default::default()
            }
            .normalize()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 1);
        let KernelSpec::Stockham(spec) = plan.kernel(plan.steps[0].kernel) else {
            panic!("expected a stockham kernel");
        };
        assert_eq!(spec.length, 4);
        assert_eq!(spec.embedded, EmbeddedKind::RealPre);
        let tw = plan.steps[0].twiddles.unwrap();
        assert!(plan.twiddles.table(tw).real_factor_offset.is_some());
    }

    #[test]
    fn prime_length_over_radix_set_is_unsupported() {
        let desc = FftRequest {
            length: vec![34],
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert!(matches!(
            Plan::new(desc),
            Err(FftError::UnsupportedLength(34))
        ));
    }

    #[test]
    fn odd_real_length_is_unsupported() {
        let desc = FftRequest {
            length: vec![9],
            transform: TransformKind::RealForward,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert!(matches!(Plan::new(desc), Err(FftError::UnsupportedLength(_))));
    }

    #[test]
    fn plans_are_deterministic() {
        let mk = || plan_c2c(vec![4096], Precision::F32, true);
        let (a, b) = (mk(), mk());
        assert_eq!(a.kernels, b.kernels);
        assert_eq!(a.steps.len(), b.steps.len());
        for (x, y) in a.steps.iter().zip(b.steps.iter()) {
            assert_eq!(x.kernel, y.kernel);
            assert_eq!(x.lengths, y.lengths);
            assert_eq!(x.strides_in, y.strides_in);
            assert_eq!(x.strides_out, y.strides_out);
        }
    }

    #[test]
    fn identical_kernels_are_interned_once() {
        // Axes 84 and 84 of the 3-D plan share one kernel spec.
        let plan = plan_c2c(vec![192, 84, 84], Precision::F32, false);
        let stockham_count = plan
            .kernels
            .iter()
            .filter(|k| matches!(k, KernelSpec::Stockham(_)))
            .count();
        assert_eq!(stockham_count, 2); // 84 and 192, interned
    }
}
