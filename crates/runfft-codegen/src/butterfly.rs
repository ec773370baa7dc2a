//! Fixed butterfly templates.
//!
//! Each radix gets one device function computing the twiddle-free DFT on
//! `W` consecutive registers. Radices 2 and 4 use the classic add/sub
//! reduced forms; the remaining radices unroll the constant matrix with
//! literal roots. Inverse butterflies flip the sign of every sine term.

use std::fmt::Write;

use runfft_core::Direction;

/// Name of the butterfly device function for `radix`.
pub fn butterfly_name(radix: usize, direction: Direction) -> String {
    match direction {
        Direction::Forward => format!("fwd_rad{radix}"),
        Direction::Inverse => format!("inv_rad{radix}"),
    }
}

/// Emit the device function for one radix/direction pair.
pub fn butterfly_function(radix: usize, direction: Direction) -> String {
    let name = butterfly_name(radix, direction);
    match radix {
        1 => format!("__device__ void {name}(scalar_type* R)\n{{\n}}\n"),
        2 => radix2(&name),
        4 => radix4(&name, direction),
        _ => generic(&name, radix, direction),
    }
}

fn radix2(name: &str) -> String {
    format!(
        "__device__ void {name}(scalar_type* R)\n\
         {{\n\
         \x20   scalar_type t = R[0];\n\
         \x20   R[0] = t + R[1];\n\
         \x20   R[1] = t - R[1];\n\
         }}\n"
    )
}

fn radix4(name: &str, direction: Direction) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "__device__ void {name}(scalar_type* R)");
    s.push_str("{\n");
    s.push_str("    scalar_type t0 = R[0] + R[2];\n");
    s.push_str("    scalar_type t1 = R[0] - R[2];\n");
    s.push_str("    scalar_type t2 = R[1] + R[3];\n");
    s.push_str("    scalar_type t3 = R[1] - R[3];\n");
    s.push_str("    R[0] = t0 + t2;\n");
    s.push_str("    R[2] = t0 - t2;\n");
    match direction {
        Direction::Forward => {
            s.push_str("    R[1].x = t1.x + t3.y;\n");
            s.push_str("    R[1].y = t1.y - t3.x;\n");
            s.push_str("    R[3].x = t1.x - t3.y;\n");
            s.push_str("    R[3].y = t1.y + t3.x;\n");
        }
        Direction::Inverse => {
            s.push_str("    R[1].x = t1.x - t3.y;\n");
            s.push_str("    R[1].y = t1.y + t3.x;\n");
            s.push_str("    R[3].x = t1.x + t3.y;\n");
            s.push_str("    R[3].y = t1.y - t3.x;\n");
        }
    }
    s.push_str("}\n");
    s
}

fn generic(name: &str, radix: usize, direction: Direction) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "__device__ void {name}(scalar_type* R)");
    s.push_str("{\n");
    let _ = writeln!(s, "    scalar_type t[{radix}];");
    for k in 0..radix {
        let _ = writeln!(s, "    t[{k}].x = R[0].x;");
        let _ = writeln!(s, "    t[{k}].y = R[0].y;");
        for j in 1..radix {
            let theta = 2.0 * std::f64::consts::PI * ((j * k) % radix) as f64 / radix as f64;
            let c = theta.cos();
            let sn = match direction {
                Direction::Forward => theta.sin(),
                Direction::Inverse => -theta.sin(),
            };
            let _ = writeln!(
                s,
                "    t[{k}].x += ({c:+.17e}) * R[{j}].x + ({sn:+.17e}) * R[{j}].y;"
            );
            let _ = writeln!(
                s,
                "    t[{k}].y += ({c:+.17e}) * R[{j}].y - ({sn:+.17e}) * R[{j}].x;"
            );
        }
    }
    for k in 0..radix {
        let _ = writeln!(s, "    R[{k}] = t[{k}];");
    }
    s.push_str("}\n");
    s
}

/// Emit butterfly functions for every distinct radix in `factors`.
pub fn butterfly_set(factors: &[usize], direction: Direction) -> String {
    let mut seen: Vec<usize> = Vec::new();
    let mut out = String::new();
    for &w in factors {
        if !seen.contains(&w) {
            seen.push(w);
            out.push_str(&butterfly_function(w, direction));
            out.push('\n');
        }
    }
    out
}
