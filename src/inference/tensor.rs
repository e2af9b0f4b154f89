//! Dense 5-D tensor `(batch, time, channel, height, width)`, row-major.

use super::InferenceError;

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: [usize; 5],
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: [usize; 5], data: Vec<f32>) -> Result<Self, InferenceError> {
        if shape.iter().product::<usize>() != data.len() {
            return Err(InferenceError::DataLength {
                shape,
                len: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 5]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn shape(&self) -> [usize; 5] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Samples per `(height, width)` plane.
    pub fn plane_len(&self) -> usize {
        self.shape[3] * self.shape[4]
    }

    fn plane_offset(&self, batch: usize, time: usize, channel: usize) -> usize {
        let [_, t, c, _, _] = self.shape;
        ((batch * t + time) * c + channel) * self.plane_len()
    }

    /// One `(height, width)` plane.
    ///
    /// Panics if the indices are out of bounds.
    pub fn frame(&self, batch: usize, time: usize, channel: usize) -> &[f32] {
        let start = self.plane_offset(batch, time, channel);
        &self.data[start..start + self.plane_len()]
    }

    pub fn frame_mut(&mut self, batch: usize, time: usize, channel: usize) -> &mut [f32] {
        let start = self.plane_offset(batch, time, channel);
        let len = self.plane_len();
        &mut self.data[start..start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_addressing() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let t = Tensor::new([1, 3, 1, 2, 4], data).unwrap();
        assert_eq!(t.frame(0, 1, 0), &[8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Tensor::new([1, 2, 1, 2, 2], vec![0.0; 7]).is_err());
    }

    #[test]
    fn test_frame_mut_writes_in_place() {
        let mut t = Tensor::zeros([1, 2, 1, 1, 2]);
        t.frame_mut(0, 1, 0).copy_from_slice(&[0.25, 0.75]);
        assert_eq!(t.data(), &[0.0, 0.0, 0.25, 0.75]);
    }
}
