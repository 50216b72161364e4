/// Complex spectrum as split real/imaginary buffers of the transform size.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
}

impl Spectrum {
    pub fn zeros(size: usize) -> Self {
        Self {
            real: vec![0.0; size],
            imag: vec![0.0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    /// |X[k]| for k = 0..size/2 (Nyquist excluded).
    pub fn magnitude(&self) -> Vec<f32> {
        let half = self.len() / 2;
        self.real[..half]
            .iter()
            .zip(&self.imag[..half])
            .map(|(re, im)| (re * re + im * im).sqrt())
            .collect()
    }

    /// |X[k]|² for k = 0..size/2.
    pub fn power(&self) -> Vec<f32> {
        let half = self.len() / 2;
        self.real[..half]
            .iter()
            .zip(&self.imag[..half])
            .map(|(re, im)| re * re + im * im)
            .collect()
    }

    /// Polar form of the first half of the spectrum. The upper half of a
    /// real signal's spectrum is the conjugate mirror and carries nothing new.
    pub fn magnitude_and_phase(&self) -> (Vec<f32>, Vec<f32>) {
        let half = self.len() / 2;
        self.real[..half]
            .iter()
            .zip(&self.imag[..half])
            .map(|(&re, &im)| ((re * re + im * im).sqrt(), im.atan2(re)))
            .unzip()
    }

    /// Rebuild a full `size`-point spectrum from half-spectrum polar data by
    /// mirroring: X[size - k] = conj(X[k]). The Nyquist bin is left at zero.
    pub fn from_magnitude_and_phase(magnitude: &[f32], phase: &[f32], size: usize) -> Self {
        let mut spectrum = Self::zeros(size);
        let half = (size / 2).min(magnitude.len()).min(phase.len());

        for k in 0..half {
            let (sin, cos) = phase[k].sin_cos();
            spectrum.real[k] = magnitude[k] * cos;
            spectrum.imag[k] = magnitude[k] * sin;
        }
        for k in 1..half {
            spectrum.real[size - k] = spectrum.real[k];
            spectrum.imag[size - k] = -spectrum.imag[k];
        }

        spectrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::Fft;

    #[test]
    fn polar_round_trip_restores_lower_half_and_mirror() {
        let size = 64;
        let fft = Fft::new(size).unwrap();
        let signal: Vec<f32> = (0..size).map(|n| (n as f32 * 0.4).sin() + 0.3).collect();
        let spectrum = fft.forward(&signal);

        let (mag, phase) = spectrum.magnitude_and_phase();
        assert_eq!(mag.len(), size / 2);

        let rebuilt = Spectrum::from_magnitude_and_phase(&mag, &phase, size);
        for k in 0..size / 2 {
            assert!((rebuilt.real[k] - spectrum.real[k]).abs() < 1e-3);
            assert!((rebuilt.imag[k] - spectrum.imag[k]).abs() < 1e-3);
        }
        for k in 1..size / 2 {
            assert_eq!(rebuilt.real[size - k], rebuilt.real[k]);
            assert_eq!(rebuilt.imag[size - k], -rebuilt.imag[k]);
        }
        assert_eq!(rebuilt.real[size / 2], 0.0);
    }

    #[test]
    fn power_is_magnitude_squared() {
        let spectrum = Spectrum {
            real: vec![3.0, 0.0, 1.0, 1.0],
            imag: vec![4.0, 2.0, 0.0, 0.0],
        };
        assert_eq!(spectrum.magnitude(), vec![5.0, 2.0]);
        assert_eq!(spectrum.power(), vec![25.0, 4.0]);
    }
}
