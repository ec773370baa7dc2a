//! Kernel token grammar.
//!
//! Tokens give the test harness a compact, greppable way to request an
//! exact plan:
//!
//! ```text
//! complex_forward_len_512_64_single_ip_batch_3_istride_192_3_CI
//!   _ostride_192_3_CI_idist_1_odist_1_ioffset_0_ooffset_0
//! ```
//!
//! `to_token` and `from_token` round-trip through the canonical
//! descriptor. The parser is lenient about trailing zero offsets so
//! tokens written with two offset slots for interleaved data still parse.

use crate::descriptor::{
    ArrayLayout, FftDescriptor, FftRequest, Placement, Precision, TransformKind,
};
use crate::error::FftError;

/// Render a canonical descriptor as a token.
pub fn to_token(desc: &FftDescriptor) -> String {
    let mut t = String::new();
    t.push_str(desc.transform.token());
    t.push_str("_len");
    for l in &desc.length {
        t.push_str(&format!("_{l}"));
    }
    t.push('_');
    t.push_str(desc.precision.token());
    t.push('_');
    t.push_str(desc.placement.token());
    t.push_str(&format!("_batch_{}", desc.batch));
    t.push_str("_istride");
    for s in &desc.istride {
        t.push_str(&format!("_{s}"));
    }
    t.push('_');
    t.push_str(desc.input_layout.token());
    t.push_str("_ostride");
    for s in &desc.ostride {
        t.push_str(&format!("_{s}"));
    }
    t.push('_');
    t.push_str(desc.output_layout.token());
    t.push_str(&format!("_idist_{}_odist_{}", desc.idist, desc.odist));
    t.push_str("_ioffset");
    for o in &desc.ioffset {
        t.push_str(&format!("_{o}"));
    }
    t.push_str("_ooffset");
    for o in &desc.ooffset {
        t.push_str(&format!("_{o}"));
    }
    t
}

struct Cursor<'a> {
    parts: Vec<&'a str>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.parts.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<&'a str, FftError> {
        let part = self
            .parts
            .get(self.pos)
            .copied()
            .ok_or_else(|| FftError::invalid_config("truncated kernel token"))?;
        self.pos += 1;
        Ok(part)
    }

    fn expect(&mut self, keyword: &str) -> Result<(), FftError> {
        let part = self.next()?;
        if part != keyword {
            return Err(FftError::invalid_config(format!(
                "kernel token: expected '{keyword}', found '{part}'"
            )));
        }
        Ok(())
    }

    fn number(&mut self) -> Result<usize, FftError> {
        let part = self.next()?;
        part.parse::<usize>().map_err(|_| {
            FftError::invalid_config(format!("kernel token: expected a number, found '{part}'"))
        })
    }

    /// Consume numbers until the next non-numeric segment.
    fn numbers(&mut self) -> Result<Vec<usize>, FftError> {
        let mut out = Vec::new();
        while let Some(part) = self.peek() {
            match part.parse::<usize>() {
                Ok(v) => {
                    out.push(v);
                    self.pos += 1;
                }
                Err(_) => break,
            }
        }
        if out.is_empty() {
            return Err(FftError::invalid_config(
                "kernel token: expected at least one number",
            ));
        }
        Ok(out)
    }
}

/// Parse a token into a canonical descriptor.
pub fn from_token(token: &str) -> Result<FftDescriptor, FftError> {
    let mut cur = Cursor {
        parts: token.split('_').collect(),
        pos: 0,
    };

    let family = cur.next()?;
    let direction = cur.next()?;
    let transform = match (family, direction) {
        ("complex", "forward") => TransformKind::ComplexForward,
        ("complex", "inverse") => TransformKind::ComplexInverse,
        ("real", "forward") => TransformKind::RealForward,
        ("real", "inverse") => TransformKind::RealInverse,
        _ => {
            return Err(FftError::invalid_config(format!(
                "kernel token: unknown transform type '{family}_{direction}'"
            )))
        }
    };

    cur.expect("len")?;
    let length = cur.numbers()?;

    let precision = match cur.next()? {
        "single" => Precision::F32,
        "double" => Precision::F64,
        other => {
            return Err(FftError::invalid_config(format!(
                "kernel token: unknown precision '{other}'"
            )))
        }
    };
    let placement = match cur.next()? {
        "ip" => Placement::InPlace,
        "op" => Placement::OutOfPlace,
        other => {
            return Err(FftError::invalid_config(format!(
                "kernel token: unknown placement '{other}'"
            )))
        }
    };

    cur.expect("batch")?;
    let batch = cur.number()?;

    cur.expect("istride")?;
    let istride = cur.numbers()?;
    let input_layout = parse_layout(cur.next()?)?;

    cur.expect("ostride")?;
    let ostride = cur.numbers()?;
    let output_layout = parse_layout(cur.next()?)?;

    cur.expect("idist")?;
    let idist = cur.number()?;
    cur.expect("odist")?;
    let odist = cur.number()?;

    cur.expect("ioffset")?;
    let mut ioffset = cur.numbers()?;
    cur.expect("ooffset")?;
    let mut ooffset = cur.numbers()?;
    if cur.peek().is_some() {
        return Err(FftError::invalid_config(
            "kernel token: trailing segments after ooffset",
        ));
    }

    trim_offsets(&mut ioffset, input_layout.buffer_count());
    trim_offsets(&mut ooffset, output_layout.buffer_count());

    FftRequest {
        length,
        batch,
        precision,
        transform,
        placement,
        input_layout: Some(input_layout),
        output_layout: Some(output_layout),
        istride,
        ostride,
        idist,
        odist,
        ioffset,
        ooffset,
    }
    .normalize()
}

fn parse_layout(tag: &str) -> Result<ArrayLayout, FftError> {
    ArrayLayout::from_token(tag)
        .ok_or_else(|| FftError::invalid_config(format!("kernel token: unknown layout '{tag}'")))
}

/// Drop trailing zero offsets written for the unused second buffer slot.
fn trim_offsets(offsets: &mut Vec<usize>, buffers: usize) {
    while offsets.len() > buffers && offsets.last() == Some(&0) {
        offsets.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_through_the_descriptor() {
        let desc = FftRequest {
            length: vec![64],
            batch: 3,
            placement: Placement::InPlace,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        let token = to_token(&desc);
        assert_eq!(
            token,
            "complex_forward_len_64_single_ip_batch_3_istride_1_CI_ostride_1_CI_idist_64_odist_64_ioffset_0_ooffset_0"
        );
        let parsed = from_token(&token).unwrap();
        assert_eq!(parsed, desc);
    }

    #[test]
    fn parses_two_dimensional_strides() {
        let desc = from_token(
            "complex_forward_len_512_64_single_ip_batch_3_istride_192_3_CI_ostride_192_3_CI_idist_98304_odist_98304_ioffset_0_0_ooffset_0_0",
        )
        .unwrap();
        assert_eq!(desc.length, vec![512, 64]);
        assert_eq!(desc.istride, vec![192, 3]);
        assert_eq!(desc.batch, 3);
        assert_eq!(desc.ioffset, vec![0]); // trailing zero slot trimmed
    }

    #[test]
    fn real_forward_token() {
        let desc = FftRequest {
            length: vec![8],
            transform: TransformKind::RealForward,
            placement: Placement::InPlace,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        let token = to_token(&desc);
        assert!(token.starts_with("real_forward_len_8_single_ip"));
        assert!(token.contains("_R_"));
        assert!(token.contains("_HI_"));
        let parsed = from_token(&token).unwrap();
        assert_eq!(parsed, desc);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(from_token("complex_forward_len_64").is_err());
        assert!(from_token("complex_sideways_len_64_single_ip_batch_1").is_err());
        assert!(from_token(
            "complex_forward_len_64_single_ip_batch_1_istride_1_XX_ostride_1_CI_idist_64_odist_64_ioffset_0_ooffset_0"
        )
        .is_err());
    }
}
