//! Tiled transpose kernels.
//!
//! One fixed template per tile size: a square LDS tile with a padding
//! column to dodge bank conflicts, read along rows, written along
//! columns. Higher dimensions and batch fold into `blockIdx.z`.

use runfft_core::kernels::TransposeSpec;

pub fn transpose_kernel_base_name(spec: &TransposeSpec) -> String {
    format!("transpose_tile{}", spec.tile)
}

pub fn transpose_global(spec: &TransposeSpec) -> String {
    let tile = spec.tile;
    let name = transpose_kernel_base_name(spec);
    format!(
        r#"__global__ void __launch_bounds__({tpb}) {name}(
    const size_t dim,
    const size_t* lengths,
    const size_t* stride_in,
    const size_t* stride_out,
    const size_t nbatch,
    void* load_cb_fn,
    void* load_cb_data,
    uint32_t load_cb_lds_bytes,
    void* store_cb_fn,
    void* store_cb_data,
    const scalar_type* ibuf,
    scalar_type* obuf)
{{
    __shared__ scalar_type tile[{tile}][{tile} + 1];
    const size_t rows = lengths[0];
    const size_t cols = lengths[1];
    const size_t batch = blockIdx.z;
    if(batch >= nbatch)
        return;
    const size_t in_base = batch * stride_in[dim];
    const size_t out_base = batch * stride_out[dim];

    const size_t r = blockIdx.x * {tile} + threadIdx.y;
    const size_t c = blockIdx.y * {tile} + threadIdx.x;
    if(r < rows && c < cols)
        tile[threadIdx.y][threadIdx.x]
            = load_global(ibuf, in_base + r * stride_in[0] + c * stride_in[1], load_cb_fn, load_cb_data);
    __syncthreads();

    const size_t oc = blockIdx.x * {tile} + threadIdx.x;
    const size_t orow = blockIdx.y * {tile} + threadIdx.y;
    if(orow < cols && oc < rows)
        store_global(obuf, out_base + orow * stride_out[0] + oc * stride_out[1],
                     tile[threadIdx.x][threadIdx.y], store_cb_fn, store_cb_data);
}}
"#,
        tpb = tile * tile,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use runfft_core::Precision;

    #[test]
    fn tile_has_a_padding_column() {
        let spec = TransposeSpec {
            precision: Precision::F32,
            tile: 16,
        };
        let text = transpose_global(&spec);
        assert!(text.contains("transpose_tile16"));
        assert!(text.contains("tile[16][16 + 1]"));
        assert!(text.contains("__syncthreads();"));
        assert!(text.contains("tile[threadIdx.x][threadIdx.y]"));
    }
}
