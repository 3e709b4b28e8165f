//! Linear-average decimation.

/// Reduce `input` from `rate_in` to `rate_out` by averaging runs of input
/// samples: each output sample is the mean of the input samples whose index
/// range maps onto it. Returns a copy unchanged when `rate_out >= rate_in`
/// (this routine only decimates).
pub fn decimate(input: &[f32], rate_in: u32, rate_out: u32) -> Vec<f32> {
    if rate_out >= rate_in || input.is_empty() {
        return input.to_vec();
    }

    let ratio = rate_in as f64 / rate_out as f64;
    let out_len = (input.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(out_len);

    let mut in_offset = 0usize;
    for out_index in 0..out_len {
        let next_offset = ((out_index + 1) as f64 * ratio).round() as usize;
        let end = next_offset.min(input.len());

        let run = &input[in_offset.min(end)..end];
        if run.is_empty() {
            output.push(0.0);
        } else {
            output.push(run.iter().sum::<f32>() / run.len() as f32);
        }
        in_offset = next_offset;
    }

    output
}
