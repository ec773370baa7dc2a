//! Common support code emitted ahead of every kernel: the complex scalar
//! type for the target precision, twiddle multiplication, and the
//! callback-aware global load/store helpers for each buffer layout.

use runfft_core::Precision;

pub fn preamble(precision: Precision) -> String {
    let real = match precision {
        Precision::F32 => "float",
        Precision::F64 => "double",
    };
    format!(
        r#"#include <hip/hip_runtime.h>

typedef {real} real_type;
struct scalar_type
{{
    real_type x;
    real_type y;
}};

__device__ static inline scalar_type operator+(const scalar_type a, const scalar_type b)
{{
    scalar_type c;
    c.x = a.x + b.x;
    c.y = a.y + b.y;
    return c;
}}

__device__ static inline scalar_type operator-(const scalar_type a, const scalar_type b)
{{
    scalar_type c;
    c.x = a.x - b.x;
    c.y = a.y - b.y;
    return c;
}}

__device__ static inline scalar_type twiddle_mul(const scalar_type a, const scalar_type w)
{{
    scalar_type c;
    c.x = a.x * w.x - a.y * w.y;
    c.y = a.x * w.y + a.y * w.x;
    return c;
}}

typedef scalar_type (*load_cb_t)(scalar_type*, size_t, void*, void*);
typedef void (*store_cb_t)(scalar_type*, size_t, scalar_type, void*, void*);

__device__ static inline scalar_type
    load_global(const scalar_type* buf, const size_t idx, void* cb_fn, void* cb_data)
{{
    if(cb_fn != nullptr)
    {{
        auto cb = reinterpret_cast<load_cb_t>(cb_fn);
        return cb(const_cast<scalar_type*>(buf), idx, cb_data, nullptr);
    }}
    return buf[idx];
}}

__device__ static inline void store_global(
    scalar_type* buf, const size_t idx, const scalar_type v, void* cb_fn, void* cb_data)
{{
    if(cb_fn != nullptr)
    {{
        auto cb = reinterpret_cast<store_cb_t>(cb_fn);
        cb(buf, idx, v, cb_data, nullptr);
        return;
    }}
    buf[idx] = v;
}}

__device__ static inline scalar_type
    load_planar(const real_type* re, const real_type* im, const size_t idx)
{{
    scalar_type v;
    v.x = re[idx];
    v.y = im[idx];
    return v;
}}

__device__ static inline void
    store_planar(real_type* re, real_type* im, const size_t idx, const scalar_type v)
{{
    re[idx] = v.x;
    im[idx] = v.y;
}}

__device__ static inline scalar_type load_real_packed(const real_type* buf, const size_t idx)
{{
    scalar_type v;
    v.x = buf[2 * idx];
    v.y = buf[2 * idx + 1];
    return v;
}}

__device__ static inline void
    store_real_packed(real_type* buf, const size_t idx, const scalar_type v)
{{
    buf[2 * idx] = v.x;
    buf[2 * idx + 1] = v.y;
}}

"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precision_selects_the_real_type() {
        assert!(preamble(Precision::F32).contains("typedef float real_type;"));
        assert!(preamble(Precision::F64).contains("typedef double real_type;"));
    }
}
