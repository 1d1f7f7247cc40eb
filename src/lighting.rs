// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! Lighting and material cache (C5, §4.5): per-light direction/half-vector
//! caching and the per-vertex Phong-like color accumulation.

use crate::fixed;
use crate::matrix::Matrix;

#[cfg(feature = "save-state")]
use serde::{Deserialize, Serialize};

fn unpack_rgb555(word: u32) -> [i32; 3] {
    [
        (word & 0x1F) as i32,
        ((word >> 5) & 0x1F) as i32,
        ((word >> 10) & 0x1F) as i32,
    ]
}

/// Unpacks a 30-bit packed direction (three 10-bit signed fractional
/// components) to three 20.12 fixed-point values.
fn unpack_direction(word: u32) -> [i32; 3] {
    let mut out = [0i32; 3];
    for (i, o) in out.iter_mut().enumerate() {
        let raw = ((word >> (i * 10)) & 0x3FF) as i32;
        let signed = (raw << 22) >> 22; // sign-extend 10 -> 32
        *o = signed << 3; // up-shift into 20.12 alignment (§4.5)
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Light {
    pub direction_raw: u32,
    pub color_raw: u16,
    pub dir_view: [i32; 3],
    pub half_vector: [i32; 3],
}

impl Light {
    pub fn color(&self) -> [i32; 3] {
        unpack_rgb555(self.color_raw as u32)
    }

    /// Recomputes `dir_view` and `half_vector` from the raw direction and
    /// the current position-vector matrix (§4.5, "cached, regenerated on
    /// every light-direction write and on Normal issue").
    pub fn recompute(&mut self, vector_mtx: &Matrix) {
        let local = unpack_direction(self.direction_raw);
        self.dir_view = vector_mtx.mul_vec3(local);

        let line_of_sight = [0, 0, -fixed::ONE];
        let sum = [
            self.dir_view[0] + line_of_sight[0],
            self.dir_view[1] + line_of_sight[1],
            self.dir_view[2] + line_of_sight[2],
        ];
        let len_sq = (sum[0] as i64) * (sum[0] as i64)
            + (sum[1] as i64) * (sum[1] as i64)
            + (sum[2] as i64) * (sum[2] as i64);
        // len_sq is in 24.24; scale back to 12.12 before the sqrt so the
        // result lands back in 20.12.
        let scaled = len_sq >> 12;
        let inv_len = if scaled > 0 {
            // 1/sqrt(scaled) computed via integer sqrt of a pre-scaled
            // reciprocal-squared value.
            let norm = fixed::isqrt(scaled);
            if norm > 0 {
                (fixed::ONE as i64 * fixed::ONE as i64 / norm) as i32
            } else {
                0
            }
        } else {
            0
        };
        self.half_vector = [
            fixed::mul(sum[0], inv_len),
            fixed::mul(sum[1], inv_len),
            fixed::mul(sum[2], inv_len),
        ];
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Material {
    pub diffuse: u16,
    pub ambient: u16,
    pub specular: u16,
    pub emission: u16,
    pub specular_table_enable: bool,
    pub shine_table: Vec<u8>,
}

impl Material {
    pub fn diffuse_rgb(&self) -> [i32; 3] {
        unpack_rgb555(self.diffuse as u32)
    }

    pub fn ambient_rgb(&self) -> [i32; 3] {
        unpack_rgb555(self.ambient as u32)
    }

    pub fn specular_rgb(&self) -> [i32; 3] {
        unpack_rgb555(self.specular as u32)
    }

    pub fn emission_rgb(&self) -> [i32; 3] {
        unpack_rgb555(self.emission as u32)
    }
}

#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct LightingState {
    pub lights: [Light; 4],
    pub material: Material,
}

impl LightingState {
    pub fn set_light_vector(&mut self, index: usize, word: u32, vector_mtx: &Matrix) {
        self.lights[index].direction_raw = word & 0x3FFF_FFFF;
        self.lights[index].recompute(vector_mtx);

        #[cfg(feature = "tracing")]
        tracing::debug!(index, "LIGHT_VECTOR");
    }

    pub fn set_light_color(&mut self, word: u32) {
        let index = ((word >> 30) & 0x3) as usize;
        self.lights[index].color_raw = (word & 0x7FFF) as u16;
    }

    pub fn set_dif_amb(&mut self, word: u32) -> bool {
        self.material.diffuse = (word & 0x7FFF) as u16;
        self.material.ambient = ((word >> 16) & 0x7FFF) as u16;
        word & (1 << 15) != 0
    }

    pub fn set_spe_emi(&mut self, word: u32) {
        self.material.specular = (word & 0x7FFF) as u16;
        self.material.emission = ((word >> 16) & 0x7FFF) as u16;
        self.material.specular_table_enable = word & (1 << 15) != 0;
    }

    pub fn set_shininess_entry(&mut self, offset: usize, word: u32) {
        if self.material.shine_table.len() < 128 {
            self.material.shine_table.resize(128, 0);
        }
        let base = offset * 4;
        for (i, b) in word.to_le_bytes().into_iter().enumerate() {
            if base + i < 128 {
                self.material.shine_table[base + i] = b;
            }
        }
    }

    /// Recomputes the cached direction/half-vector for all four lights;
    /// called on every `Normal` issue (§4.5).
    pub fn recompute_all(&mut self, vector_mtx: &Matrix) {
        for light in &mut self.lights {
            light.recompute(vector_mtx);
        }
    }

    /// Per-Normal vertex coloring (§4.5): accumulates emission plus each
    /// enabled light's diffuse/specular/ambient contribution, then clamps
    /// each channel to `[0, 31]`.
    pub fn shade(&self, normal: [i32; 3], light_enable_mask: i32) -> [i32; 3] {
        let emission = self.material.emission_rgb();
        let diffuse_mat = self.material.diffuse_rgb();
        let specular_mat = self.material.specular_rgb();
        let ambient_mat = self.material.ambient_rgb();

        let mut rgb = emission;

        for i in 0..4 {
            if light_enable_mask & (1 << i) == 0 {
                continue;
            }
            let light = &self.lights[i];
            let light_color = light.color();

            let diffuse_term = (-fixed::vec3_dot(light.dir_view, normal)).max(0);

            let neg_half = [-light.half_vector[0], -light.half_vector[1], -light.half_vector[2]];
            let d = fixed::vec3_dot(neg_half, normal);
            let mut shininess = if d > 0 {
                2 * fixed::mul(d, d) - fixed::ONE
            } else {
                0
            };
            shininess = shininess.clamp(0, 4095);
            if self.material.specular_table_enable && !self.material.shine_table.is_empty() {
                let idx = (shininess >> 5) as usize;
                let idx = idx.min(self.material.shine_table.len() - 1);
                shininess = (self.material.shine_table[idx] as i32) << 4;
            }

            for c in 0..3 {
                rgb[c] += (specular_mat[c] * light_color[c] * shininess) >> 17;
                rgb[c] += (diffuse_mat[c] * light_color[c] * diffuse_term) >> 17;
                rgb[c] += (ambient_mat[c] * light_color[c]) >> 5;
            }
        }

        [rgb[0].clamp(0, 31), rgb[1].clamp(0, 31), rgb[2].clamp(0, 31)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_direction_sign_extends() {
        // 10-bit value 0x3FF is -1 in ten-bit two's complement.
        let word = 0x3FF;
        let v = unpack_direction(word);
        assert_eq!(v[0], -1 << 3);
        assert_eq!(v[1], 0);
        assert_eq!(v[2], 0);
    }

    #[test]
    fn shade_with_no_lights_is_just_emission() {
        let mut state = LightingState::default();
        state.material.emission = 0x7FFF; // full white
        let rgb = state.shade([0, 0, fixed::ONE], 0);
        assert_eq!(rgb, [31, 31, 31]);
    }
}
