use crate::{
    error::{Result, SimulationError},
    floating_type_mod::{FT, PI},
};

/**
 * The three SPH kernels (Müller et al. 2003) for one fixed smoothing radius.
 *
 * Every kernel takes the scalar distance `r` between two particles and is
 * exactly zero for `r < 0` and `r > h`. The normalization constants depend on
 * `h` only, so they are computed once in `new` and `h` cannot be changed
 * afterwards.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphKernels {
    h: FT,
    h_sq: FT,
    poly6_norm: FT,
    spiky_grad_norm: FT,
    viscosity_laplacian_norm: FT,
}

impl SphKernels {
    pub fn new(h: FT) -> Result<Self> {
        if !h.is_finite() || h <= 0. {
            return Err(SimulationError::InvalidSmoothingRadius(h));
        }

        let h3 = h * h * h;
        let h6 = h3 * h3;
        let h9 = h6 * h3;

        Ok(SphKernels {
            h,
            h_sq: h * h,
            poly6_norm: 315. / (64. * PI * h9),
            spiky_grad_norm: -3. * (15. / (PI * h6)),
            viscosity_laplacian_norm: 45. / (PI * h6),
        })
    }

    /** Smoothing radius, which is also the kernel support radius. */
    pub fn h(&self) -> FT {
        self.h
    }

    #[inline(always)]
    fn outside_support(&self, r: FT) -> bool {
        // written so that NaN also counts as outside
        !(r >= 0. && r <= self.h)
    }

    /** Density kernel, proportional to `(h² - r²)³`. */
    #[inline(always)]
    pub fn poly6(&self, r: FT) -> FT {
        if self.outside_support(r) {
            return 0.;
        }
        let v = self.h_sq - r * r;
        self.poly6_norm * v * v * v
    }

    /**
     * Radial derivative of the spiky kernel, proportional to `-(h - r)²`.
     *
     * This is a magnitude only. The caller multiplies it with the unit vector
     * between the two particles.
     */
    #[inline(always)]
    pub fn spiky_gradient(&self, r: FT) -> FT {
        if self.outside_support(r) {
            return 0.;
        }
        let v = self.h - r;
        self.spiky_grad_norm * v * v
    }

    /** Laplacian of the viscosity kernel, proportional to `(h - r)`. */
    #[inline(always)]
    pub fn viscosity_laplacian(&self, r: FT) -> FT {
        if self.outside_support(r) {
            return 0.;
        }
        self.viscosity_laplacian_norm * (self.h - r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ft_approx_eq, vec3f};

    #[test]
    fn rejects_degenerate_smoothing_radius() {
        for h in [0., -0.2, FT::NAN, FT::INFINITY] {
            assert!(SphKernels::new(h).is_err(), "h={} should be rejected", h);
        }
        assert!(SphKernels::new(0.2).is_ok());
    }

    #[test]
    fn kernels_vanish_outside_support() {
        let kernels = SphKernels::new(0.2).unwrap();
        let h = kernels.h();

        for r in [-1., -1.0e-9, h + h * 1.0e-6, 2. * h, 100., FT::INFINITY, FT::NAN] {
            assert_eq!(kernels.poly6(r), 0., "poly6({})", r);
            assert_eq!(kernels.spiky_gradient(r), 0., "spiky_gradient({})", r);
            assert_eq!(kernels.viscosity_laplacian(r), 0., "viscosity_laplacian({})", r);
        }

        // the support boundary itself evaluates to zero as well
        assert_eq!(kernels.poly6(h), 0.);
        assert_eq!(kernels.spiky_gradient(h), 0.);
        assert_eq!(kernels.viscosity_laplacian(h), 0.);
    }

    #[test]
    fn kernel_signs_inside_support() {
        let kernels = SphKernels::new(0.2).unwrap();
        for i in 0..20 {
            let r = i as FT * 0.01;
            assert!(kernels.poly6(r) > 0.);
            assert!(kernels.spiky_gradient(r) < 0.);
            assert!(kernels.viscosity_laplacian(r) > 0.);
        }
    }

    #[test]
    fn poly6_integration_test() {
        let kernels = SphKernels::new(0.2).unwrap();
        let h = kernels.h();
        let grid_size = 60;
        let cube_len = 2. * h / grid_size as FT;
        let cube_volume = cube_len * cube_len * cube_len;

        let mut integral: f64 = 0.;
        for z in 0..grid_size {
            for y in 0..grid_size {
                for x in 0..grid_size {
                    let integration_point = vec3f(
                        (x as FT + 0.5) * cube_len - h,
                        (y as FT + 0.5) * cube_len - h,
                        (z as FT + 0.5) * cube_len - h,
                    );
                    integral += (kernels.poly6(integration_point.norm()) * cube_volume) as f64;
                }
            }
        }

        println!("Integration of poly6 kernel with h={:.2}: {}", h, integral);
        assert_ft_approx_eq(integral, 1.0, 0.01, || format!("poly6 integral"));
    }

    #[test]
    fn spiky_gradient_derivative_test() {
        let h: FT = 1.;
        let kernels = SphKernels::new(h).unwrap();
        let spiky = |r: FT| 15. / (PI * h.powi(6)) * (h - r).powi(3);

        let diff = 1.0e-2;
        for i in 1..100 {
            let r = i as FT * 0.01;
            let approx_deriv = (spiky(r + diff * 0.5) - spiky(r - diff * 0.5)) / diff;
            assert_ft_approx_eq(kernels.spiky_gradient(r), approx_deriv, 2.0e-3, || {
                format!("spiky gradient at r={}", r)
            });
        }
    }

    #[test]
    fn viscosity_laplacian_is_linear_in_distance() {
        let kernels = SphKernels::new(0.2).unwrap();
        let at_zero = kernels.viscosity_laplacian(0.);
        assert_ft_approx_eq(at_zero, 45. / (PI * 0.2 * 0.2 * 0.2 * 0.2 * 0.2), at_zero * 1.0e-5, || {
            format!("viscosity laplacian at zero")
        });
        assert_ft_approx_eq(kernels.viscosity_laplacian(0.1), at_zero * 0.5, at_zero * 1.0e-5, || {
            format!("viscosity laplacian at h/2")
        });
    }

    #[test]
    fn kernels_are_symmetric_in_particle_order() {
        let kernels = SphKernels::new(0.2).unwrap();
        let a = vec3f(0.013, -0.7, 2.25);
        let points = [
            vec3f(0.05, -0.69, 2.3),
            vec3f(0.1, -0.61, 2.2),
            vec3f(0.013, -0.7, 2.25),
            vec3f(-0.08, -0.75, 2.19),
        ];
        for b in points {
            let r_ab = (a - b).norm();
            let r_ba = (b - a).norm();
            assert_eq!(kernels.poly6(r_ab), kernels.poly6(r_ba));
            assert_eq!(kernels.spiky_gradient(r_ab), kernels.spiky_gradient(r_ba));
            assert_eq!(kernels.viscosity_laplacian(r_ab), kernels.viscosity_laplacian(r_ba));
        }
    }
}
