// SPDX-FileCopyrightText: (C) 2017 PSISP
// SPDX-License-Identifier: GPL-3.0-or-later
//! Bit-packed control and status registers (§6).

#[cfg(feature = "save-state")]
use serde::{Deserialize, Serialize};

/// GPU 3D display control register.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct Disp3DCntReg {
    pub texture_mapping: bool,
    pub highlight_shading: bool,
    pub alpha_test: bool,
    pub alpha_blending: bool,
    pub anti_aliasing: bool,
    pub edge_marking: bool,
    pub fog_color_mode: bool,
    pub fog_enable: bool,
    pub fog_depth_shift: i32,
    pub color_buffer_underflow: bool,
    pub ram_overflow: bool,
    pub rear_plane_mode: bool,
}

impl Disp3DCntReg {
    pub fn get(&self) -> u16 {
        let mut reg: u16 = 0;
        reg |= self.texture_mapping as u16;
        reg |= (self.highlight_shading as u16) << 1;
        reg |= (self.alpha_test as u16) << 2;
        reg |= (self.alpha_blending as u16) << 3;
        reg |= (self.anti_aliasing as u16) << 4;
        reg |= (self.edge_marking as u16) << 5;
        reg |= (self.fog_color_mode as u16) << 6;
        reg |= (self.fog_enable as u16) << 7;
        reg |= (self.fog_depth_shift as u16) << 8;
        reg |= (self.color_buffer_underflow as u16) << 12;
        reg |= (self.ram_overflow as u16) << 13;
        reg |= (self.rear_plane_mode as u16) << 14;
        reg
    }

    pub fn set(&mut self, word: u16) {
        self.texture_mapping = (word & 1) != 0;
        self.highlight_shading = (word & (1 << 1)) != 0;
        self.alpha_test = (word & (1 << 2)) != 0;
        self.alpha_blending = (word & (1 << 3)) != 0;
        self.anti_aliasing = (word & (1 << 4)) != 0;
        self.edge_marking = (word & (1 << 5)) != 0;
        self.fog_color_mode = (word & (1 << 6)) != 0;
        self.fog_enable = (word & (1 << 7)) != 0;
        self.fog_depth_shift = ((word >> 8) & 0xF) as i32;
        self.rear_plane_mode = (word & (1 << 14)) != 0;
    }
}

/// Texture image parameter register (§6 TEXIMAGE_PARAM).
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct TexImageParamReg {
    pub vram_offset: i32,
    pub repeat_s: bool,
    pub repeat_t: bool,
    pub flip_s: bool,
    pub flip_t: bool,
    pub s_size: i32,
    pub t_size: i32,
    pub format: i32,
    pub color0_transparent: bool,
    pub transformation_mode: i32,
}

impl TexImageParamReg {
    pub fn set(&mut self, word: u32) {
        #[cfg(feature = "tracing")]
        tracing::debug!(word = format_args!("{word:08X}"), "TEXIMAGE_PARAM");

        self.vram_offset = (word & 0xFFFF) as i32;
        self.repeat_s = (word & (1 << 16)) != 0;
        self.repeat_t = (word & (1 << 17)) != 0;
        self.flip_s = (word & (1 << 18)) != 0;
        self.flip_t = (word & (1 << 19)) != 0;
        self.s_size = ((word >> 20) & 0x7) as i32;
        self.t_size = ((word >> 23) & 0x7) as i32;
        self.format = ((word >> 26) & 0x7) as i32;
        self.color0_transparent = (word & (1 << 29)) != 0;
        self.transformation_mode = (word >> 30) as i32;
    }
}

/// Polygon attribute register (§6 POLYGON_ATTR), latched at SET time,
/// applied to new polygons at the following BEGIN_VTXS.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct PolygonAttrReg {
    pub light_enable: i32,
    pub polygon_mode: i32,
    pub render_back: bool,
    pub render_front: bool,
    pub set_new_trans_depth: bool,
    pub render_1dot: bool,
    pub render_far_intersect: bool,
    pub depth_test_equal: bool,
    pub fog_enable: bool,
    pub alpha: i32,
    pub id: i32,
}

impl PolygonAttrReg {
    pub fn set(&mut self, word: u32) {
        self.light_enable = (word & 0xF) as i32;
        self.polygon_mode = ((word >> 4) & 0x3) as i32;
        self.render_back = (word & (1 << 6)) != 0;
        self.render_front = (word & (1 << 7)) != 0;
        self.set_new_trans_depth = (word & (1 << 11)) != 0;
        self.render_far_intersect = (word & (1 << 12)) != 0;
        self.render_1dot = (word & (1 << 13)) != 0;
        self.depth_test_equal = (word & (1 << 14)) != 0;
        self.fog_enable = (word & (1 << 15)) != 0;
        self.alpha = ((word >> 16) & 0x1F) as i32;
        self.id = ((word >> 24) & 0x3F) as i32;
    }
}

/// Viewport register (§6 VIEWPORT): `(X2-X1+1)` width, `(Y2-Y1+1)` height,
/// both mod 256; `Y1` values above 191 wrap as `Y1 - 255`.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct ViewportReg {
    pub x1: u8,
    pub y1: u8,
    pub x2: u8,
    pub y2: u8,
}

impl ViewportReg {
    /// Unpacks the raw `X1,Y1,X2,Y2` bytes as stored on each polygon (§6);
    /// the viewport->screen transform itself (width/height, `Y1` wrap) is
    /// the rasterizer's job, out of scope for this engine.
    pub fn set(&mut self, word: u32) {
        self.x1 = (word & 0xFF) as u8;
        self.y1 = ((word >> 8) & 0xFF) as u8;
        self.x2 = ((word >> 16) & 0xFF) as u8;
        self.y2 = ((word >> 24) & 0xFF) as u8;
    }
}

/// GX status register (§6). `mtx_overflow` is sticky: once set it stays
/// set until the host explicitly clears it.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "save-state", derive(Serialize, Deserialize))]
pub struct GxStatReg {
    pub box_pos_vec_busy: bool,
    pub boxtest_result: bool,
    pub mtx_stack_busy: bool,
    pub mtx_overflow: bool,
    pub geo_busy: bool,
    pub gxfifo_irq_stat: i32,
}

impl GxStatReg {
    pub fn get(&self, gxfifo_len: usize, gxpipe_len: usize) -> u32 {
        let mut reg: u32 = 0;
        reg |= self.box_pos_vec_busy as u32;
        reg |= (self.boxtest_result as u32) << 1;
        reg |= (self.mtx_stack_busy as u32) << 14;
        reg |= (self.mtx_overflow as u32) << 15;
        reg |= ((gxfifo_len + gxpipe_len) as u32 & 0x1FF) << 16;
        reg |= ((gxfifo_len < 128) as u32) << 25;
        reg |= ((gxfifo_len == 0) as u32) << 26;
        reg |= (self.geo_busy as u32) << 27;
        reg |= (self.gxfifo_irq_stat as u32) << 30;
        reg
    }

    pub fn clear_overflow(&mut self) {
        self.mtx_overflow = false;
    }
}
