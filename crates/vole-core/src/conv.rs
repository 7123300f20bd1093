use crate::error::{Error, Result};

// Convolution / pooling descriptors
//
// Every conv and pool kernel starts by resolving strides, dilations and the
// padding mode into a ConvInfo (or Conv3dInfo). The descriptor is computed
// once per call and then only read by the nested loops:
//
//   effective_filter = (filter - 1) * dilation + 1
//
//   Same:     out = ceil(in / stride)
//             pad_total = max(0, (out - 1) * stride + effective_filter - in)
//             pad_before = pad_total / 2, pad_after = pad_total - pad_before
//   Valid:    out = ceil((in - effective_filter + 1) / stride), no padding
//   Explicit: out = (in + before + after - effective_filter) / stride + 1
//
// Layout is channels-last: NHWC inputs with HWIO filters (NDHWC / DHWIO in
// 3D). Conv2d also accepts NCHW; the descriptor records which one was used.

/// How spatial padding is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Padding {
    Valid,
    Same,
    /// One `[before, after]` pair per spatial dimension.
    Explicit(Vec<[usize; 2]>),
}

/// Memory order of the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    #[default]
    ChannelsLast,
    ChannelsFirst,
}

/// Resolved padding per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PadInfo {
    pub front: usize,
    pub back: usize,
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

/// Resolved parameters of a 2D convolution or pooling window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvInfo {
    pub batch_size: usize,
    pub in_height: usize,
    pub in_width: usize,
    pub in_channels: usize,
    pub out_height: usize,
    pub out_width: usize,
    pub out_channels: usize,
    pub stride_height: usize,
    pub stride_width: usize,
    pub dilation_height: usize,
    pub dilation_width: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub effective_filter_height: usize,
    pub effective_filter_width: usize,
    pub pad: PadInfo,
    pub data_format: DataFormat,
    /// Input shape in the caller's data format.
    pub in_shape: Vec<usize>,
    /// Output shape in the caller's data format.
    pub out_shape: Vec<usize>,
    pub filter_shape: Vec<usize>,
}

impl ConvInfo {
    /// Channels-last output shape `[batch, out_h, out_w, out_c]`.
    pub fn out_shape_nhwc(&self) -> Vec<usize> {
        vec![
            self.batch_size,
            self.out_height,
            self.out_width,
            self.out_channels,
        ]
    }
}

/// Resolved parameters of a 3D convolution or pooling window (NDHWC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv3dInfo {
    pub batch_size: usize,
    pub in_depth: usize,
    pub in_height: usize,
    pub in_width: usize,
    pub in_channels: usize,
    pub out_depth: usize,
    pub out_height: usize,
    pub out_width: usize,
    pub out_channels: usize,
    pub stride_depth: usize,
    pub stride_height: usize,
    pub stride_width: usize,
    pub dilation_depth: usize,
    pub dilation_height: usize,
    pub dilation_width: usize,
    pub filter_depth: usize,
    pub filter_height: usize,
    pub filter_width: usize,
    pub effective_filter_depth: usize,
    pub effective_filter_height: usize,
    pub effective_filter_width: usize,
    pub pad: PadInfo,
    pub in_shape: Vec<usize>,
    pub out_shape: Vec<usize>,
    pub filter_shape: Vec<usize>,
}

fn effective_size(filter: usize, dilation: usize) -> usize {
    if filter == 0 {
        0
    } else {
        (filter - 1) * dilation + 1
    }
}

/// Output size and (before, after) padding for one spatial dimension.
fn resolve_dim(
    input: usize,
    effective_filter: usize,
    stride: usize,
    padding: &Padding,
    spatial_index: usize,
) -> Result<(usize, usize, usize)> {
    if stride == 0 {
        return Err(Error::InvalidSize {
            op: "conv",
            value: 0,
            reason: "strides must be positive".into(),
        });
    }
    match padding {
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = (out.max(1) - 1) * stride + effective_filter;
            let total = needed.saturating_sub(input);
            let before = total / 2;
            Ok((out, before, total - before))
        }
        Padding::Valid => {
            if effective_filter > input {
                return Err(Error::msg(format!(
                    "filter of effective size {} is larger than input size {} with valid padding",
                    effective_filter, input
                )));
            }
            let out = (input - effective_filter + 1).div_ceil(stride);
            Ok((out, 0, 0))
        }
        Padding::Explicit(pairs) => {
            let [before, after] = *pairs.get(spatial_index).ok_or_else(|| {
                Error::msg(format!(
                    "explicit padding has {} pairs, needed an entry for spatial dim {}",
                    pairs.len(),
                    spatial_index
                ))
            })?;
            let padded = input + before + after;
            if effective_filter > padded {
                return Err(Error::msg(format!(
                    "filter of effective size {} is larger than padded input size {}",
                    effective_filter, padded
                )));
            }
            Ok(((padded - effective_filter) / stride + 1, before, after))
        }
    }
}

/// Build the descriptor of a 2D convolution.
///
/// - `in_shape`: `[N, H, W, C]` (or `[N, C, H, W]` with `ChannelsFirst`)
/// - `filter_shape`: `[fH, fW, C_in, C_out]`; for depthwise the last dim is
///   the channel multiplier and `out_channels = C_in * multiplier`.
pub fn compute_conv2d_info(
    in_shape: &[usize],
    filter_shape: &[usize],
    strides: [usize; 2],
    dilations: [usize; 2],
    padding: &Padding,
    depthwise: bool,
    data_format: DataFormat,
) -> Result<ConvInfo> {
    if in_shape.len() != 4 {
        return Err(Error::RankMismatch {
            op: "conv2d input",
            expected: 4,
            got: in_shape.len(),
        });
    }
    if filter_shape.len() != 4 {
        return Err(Error::RankMismatch {
            op: "conv2d filter",
            expected: 4,
            got: filter_shape.len(),
        });
    }
    let (batch_size, in_height, in_width, in_channels) = match data_format {
        DataFormat::ChannelsLast => (in_shape[0], in_shape[1], in_shape[2], in_shape[3]),
        DataFormat::ChannelsFirst => (in_shape[0], in_shape[2], in_shape[3], in_shape[1]),
    };
    let [filter_height, filter_width, filter_in, filter_out] =
        [filter_shape[0], filter_shape[1], filter_shape[2], filter_shape[3]];
    if filter_in != in_channels {
        return Err(Error::msg(format!(
            "conv2d: input has {} channels but filter expects {}",
            in_channels, filter_in
        )));
    }
    let [stride_height, stride_width] = strides;
    let [dilation_height, dilation_width] = dilations;
    if dilation_height == 0 || dilation_width == 0 {
        return Err(Error::InvalidSize {
            op: "conv2d",
            value: 0,
            reason: "dilations must be positive".into(),
        });
    }
    let effective_filter_height = effective_size(filter_height, dilation_height);
    let effective_filter_width = effective_size(filter_width, dilation_width);

    let (out_height, top, bottom) =
        resolve_dim(in_height, effective_filter_height, stride_height, padding, 0)?;
    let (out_width, left, right) =
        resolve_dim(in_width, effective_filter_width, stride_width, padding, 1)?;

    let out_channels = if depthwise {
        filter_out * in_channels
    } else {
        filter_out
    };
    let out_shape = match data_format {
        DataFormat::ChannelsLast => vec![batch_size, out_height, out_width, out_channels],
        DataFormat::ChannelsFirst => vec![batch_size, out_channels, out_height, out_width],
    };

    Ok(ConvInfo {
        batch_size,
        in_height,
        in_width,
        in_channels,
        out_height,
        out_width,
        out_channels,
        stride_height,
        stride_width,
        dilation_height,
        dilation_width,
        filter_height,
        filter_width,
        effective_filter_height,
        effective_filter_width,
        pad: PadInfo {
            top,
            bottom,
            left,
            right,
            ..PadInfo::default()
        },
        data_format,
        in_shape: in_shape.to_vec(),
        out_shape,
        filter_shape: filter_shape.to_vec(),
    })
}

/// Descriptor of a 2D pooling window over an NHWC input.
pub fn compute_pool2d_info(
    in_shape: &[usize],
    filter_size: [usize; 2],
    strides: [usize; 2],
    dilations: [usize; 2],
    padding: &Padding,
) -> Result<ConvInfo> {
    let channels = *in_shape.get(3).ok_or(Error::RankMismatch {
        op: "pool2d input",
        expected: 4,
        got: in_shape.len(),
    })?;
    let filter_shape = [filter_size[0], filter_size[1], channels, channels];
    compute_conv2d_info(
        in_shape,
        &filter_shape,
        strides,
        dilations,
        padding,
        false,
        DataFormat::ChannelsLast,
    )
}

/// Build the descriptor of a 3D convolution over an NDHWC input with a
/// `[fD, fH, fW, C_in, C_out]` filter.
pub fn compute_conv3d_info(
    in_shape: &[usize],
    filter_shape: &[usize],
    strides: [usize; 3],
    dilations: [usize; 3],
    padding: &Padding,
) -> Result<Conv3dInfo> {
    if in_shape.len() != 5 {
        return Err(Error::RankMismatch {
            op: "conv3d input",
            expected: 5,
            got: in_shape.len(),
        });
    }
    if filter_shape.len() != 5 {
        return Err(Error::RankMismatch {
            op: "conv3d filter",
            expected: 5,
            got: filter_shape.len(),
        });
    }
    let (batch_size, in_depth, in_height, in_width, in_channels) =
        (in_shape[0], in_shape[1], in_shape[2], in_shape[3], in_shape[4]);
    let (filter_depth, filter_height, filter_width) =
        (filter_shape[0], filter_shape[1], filter_shape[2]);
    if filter_shape[3] != in_channels {
        return Err(Error::msg(format!(
            "conv3d: input has {} channels but filter expects {}",
            in_channels, filter_shape[3]
        )));
    }
    let out_channels = filter_shape[4];
    let [stride_depth, stride_height, stride_width] = strides;
    let [dilation_depth, dilation_height, dilation_width] = dilations;
    if dilations.iter().any(|&d| d == 0) {
        return Err(Error::InvalidSize {
            op: "conv3d",
            value: 0,
            reason: "dilations must be positive".into(),
        });
    }
    let effective_filter_depth = effective_size(filter_depth, dilation_depth);
    let effective_filter_height = effective_size(filter_height, dilation_height);
    let effective_filter_width = effective_size(filter_width, dilation_width);

    let (out_depth, front, back) =
        resolve_dim(in_depth, effective_filter_depth, stride_depth, padding, 0)?;
    let (out_height, top, bottom) =
        resolve_dim(in_height, effective_filter_height, stride_height, padding, 1)?;
    let (out_width, left, right) =
        resolve_dim(in_width, effective_filter_width, stride_width, padding, 2)?;

    Ok(Conv3dInfo {
        batch_size,
        in_depth,
        in_height,
        in_width,
        in_channels,
        out_depth,
        out_height,
        out_width,
        out_channels,
        stride_depth,
        stride_height,
        stride_width,
        dilation_depth,
        dilation_height,
        dilation_width,
        filter_depth,
        filter_height,
        filter_width,
        effective_filter_depth,
        effective_filter_height,
        effective_filter_width,
        pad: PadInfo {
            front,
            back,
            top,
            bottom,
            left,
            right,
        },
        in_shape: in_shape.to_vec(),
        out_shape: vec![batch_size, out_depth, out_height, out_width, out_channels],
        filter_shape: filter_shape.to_vec(),
    })
}

/// Descriptor of a 3D pooling window over an NDHWC input.
pub fn compute_pool3d_info(
    in_shape: &[usize],
    filter_size: [usize; 3],
    strides: [usize; 3],
    dilations: [usize; 3],
    padding: &Padding,
) -> Result<Conv3dInfo> {
    let channels = *in_shape.get(4).ok_or(Error::RankMismatch {
        op: "pool3d input",
        expected: 5,
        got: in_shape.len(),
    })?;
    let filter_shape = [
        filter_size[0],
        filter_size[1],
        filter_size[2],
        channels,
        channels,
    ];
    compute_conv3d_info(in_shape, &filter_shape, strides, dilations, padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_padding() {
        let info = compute_conv2d_info(
            &[1, 5, 5, 1],
            &[3, 3, 1, 2],
            [2, 2],
            [1, 1],
            &Padding::Same,
            false,
            DataFormat::ChannelsLast,
        )
        .unwrap();
        assert_eq!(info.out_shape, vec![1, 3, 3, 2]);
        assert_eq!((info.pad.top, info.pad.bottom), (1, 1));
    }

    #[test]
    fn test_valid_padding_with_dilation() {
        let info = compute_conv2d_info(
            &[1, 7, 7, 3],
            &[3, 3, 3, 4],
            [1, 1],
            [2, 2],
            &Padding::Valid,
            false,
            DataFormat::ChannelsLast,
        )
        .unwrap();
        assert_eq!(info.effective_filter_height, 5);
        assert_eq!((info.out_height, info.out_width), (3, 3));
    }

    #[test]
    fn test_explicit_padding() {
        let info = compute_conv2d_info(
            &[1, 4, 4, 1],
            &[2, 2, 1, 1],
            [1, 1],
            [1, 1],
            &Padding::Explicit(vec![[1, 0], [0, 1]]),
            false,
            DataFormat::ChannelsLast,
        )
        .unwrap();
        assert_eq!((info.out_height, info.out_width), (4, 4));
        assert_eq!((info.pad.top, info.pad.left), (1, 0));
    }

    #[test]
    fn test_depthwise_channels() {
        let info = compute_conv2d_info(
            &[2, 4, 4, 3],
            &[2, 2, 3, 2],
            [1, 1],
            [1, 1],
            &Padding::Valid,
            true,
            DataFormat::ChannelsLast,
        )
        .unwrap();
        assert_eq!(info.out_channels, 6);
    }

    #[test]
    fn test_channel_mismatch() {
        let err = compute_conv2d_info(
            &[1, 4, 4, 3],
            &[2, 2, 2, 1],
            [1, 1],
            [1, 1],
            &Padding::Valid,
            false,
            DataFormat::ChannelsLast,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_pool3d_info() {
        let info =
            compute_pool3d_info(&[1, 4, 4, 4, 2], [2, 2, 2], [2, 2, 2], [1, 1, 1], &Padding::Valid)
                .unwrap();
        assert_eq!(info.out_shape, vec![1, 2, 2, 2, 2]);
    }
}
