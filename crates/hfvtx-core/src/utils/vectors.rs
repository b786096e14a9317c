use std::{fmt::Display, iter::Sum};

use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A three-vector of `f64`s, used for momenta and positions in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:6.3}, {:6.3}, {:6.3}]", self.x, self.y, self.z)
    }
}

impl From<Vector3<f64>> for Vec3 {
    fn from(value: Vector3<f64>) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl From<Vec3> for Vector3<f64> {
    fn from(value: Vec3) -> Self {
        Vector3::new(value.x, value.y, value.z)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(value: [f64; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Interpret the vector as a three-momentum and attach a mass hypothesis.
    pub fn with_mass(&self, mass: f64) -> Vec4 {
        let e = (mass.powi(2) + self.mag2()).sqrt();
        Vec4::new(self.x, self.y, self.z, e)
    }

    pub fn with_energy(&self, energy: f64) -> Vec4 {
        Vec4::new(self.x, self.y, self.z, energy)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
    pub fn mag2(&self) -> f64 {
        self.dot(self)
    }
    pub fn mag(&self) -> f64 {
        self.mag2().sqrt()
    }
    /// The magnitude of the transverse (x, y) component.
    pub fn pt(&self) -> f64 {
        self.x.hypot(self.y)
    }
    pub fn costheta(&self) -> f64 {
        self.z / self.mag()
    }
    pub fn theta(&self) -> f64 {
        self.costheta().acos()
    }
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }
    /// Pseudorapidity, $`\eta = \sinh^{-1}(p_z / p_T)`$.
    pub fn eta(&self) -> f64 {
        (self.z / self.pt()).asinh()
    }
    pub fn unit(&self) -> Self {
        self / self.mag()
    }
}

impl_op_ex!(+ |a: &Vec3, b: &Vec3| -> Vec3 { Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z) });
impl_op_ex!(-|a: &Vec3, b: &Vec3| -> Vec3 { Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z) });
impl_op_ex!(-|a: &Vec3| -> Vec3 { Vec3::new(-a.x, -a.y, -a.z) });
impl_op_ex_commutative!(*|a: &Vec3, b: &f64| -> Vec3 { Vec3::new(a.x * b, a.y * b, a.z * b) });
impl_op_ex!(/ |a: &Vec3, b: &f64| -> Vec3 { Vec3::new(a.x / b, a.y / b, a.z / b) });

impl Sum for Vec3 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Vec3::default(), |acc, v| acc + v)
    }
}

/// A four-momentum $`(p_x, p_y, p_z, E)`$.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec4 {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

impl Display for Vec4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[e = {:.5}; p = ({:.5}, {:.5}, {:.5}); m = {:.5}]",
            self.e,
            self.px,
            self.py,
            self.pz,
            self.m()
        )
    }
}

impl Vec4 {
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    pub fn vec3(&self) -> Vec3 {
        Vec3::new(self.px, self.py, self.pz)
    }
    pub fn beta(&self) -> Vec3 {
        self.vec3() / self.e
    }
    pub fn gamma(&self) -> f64 {
        self.e / self.mag2().sqrt()
    }
    pub fn mag2(&self) -> f64 {
        self.e * self.e - self.vec3().mag2()
    }
    pub fn mag(&self) -> f64 {
        self.mag2().sqrt()
    }
    /// The squared invariant mass.
    pub fn m2(&self) -> f64 {
        self.mag2()
    }
    /// The invariant mass, clamped to zero for slightly spacelike vectors from rounding.
    pub fn m(&self) -> f64 {
        self.m2().max(0.0).sqrt()
    }
    pub fn pt(&self) -> f64 {
        self.vec3().pt()
    }
    pub fn boost(&self, beta: &Vec3) -> Self {
        let b2 = beta.dot(beta);
        if b2 == 0.0 {
            return *self;
        }
        let gamma = 1.0 / (1.0 - b2).sqrt();
        let p3 = self.vec3() + beta * ((gamma - 1.0) * self.vec3().dot(beta) / b2 + gamma * self.e);
        Self::new(p3.x, p3.y, p3.z, gamma * (self.e + beta.dot(&self.vec3())))
    }
}

impl_op_ex!(+ |a: &Vec4, b: &Vec4| -> Vec4 { Vec4::new(a.px + b.px, a.py + b.py, a.pz + b.pz, a.e + b.e) });
impl_op_ex!(-|a: &Vec4, b: &Vec4| -> Vec4 { Vec4::new(a.px - b.px, a.py - b.py, a.pz - b.pz, a.e - b.e) });
impl_op_ex!(-|a: &Vec4| -> Vec4 { Vec4::new(-a.px, -a.py, -a.pz, -a.e) });

impl Sum for Vec4 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Vec4::default(), |acc, v| acc + v)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_vec_sums() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        let res = a + b;
        assert_eq!(res.x, 5.0);
        assert_eq!(res.y, 7.0);
        assert_eq!(res.z, 9.0);
        let total: Vec3 = [a, b, -a].into_iter().sum();
        assert_eq!(total, b);
    }

    #[test]
    fn test_three_to_four_momentum_conversion() {
        let p3 = Vec3::new(1.0, 2.0, 3.0);
        let target_p4 = Vec4::new(1.0, 2.0, 3.0, 10.0);
        let p4_from_mass = p3.with_mass(target_p4.mag());
        assert_relative_eq!(target_p4.e, p4_from_mass.e);
        assert_relative_eq!(target_p4.px, p4_from_mass.px);
        assert_relative_eq!(target_p4.py, p4_from_mass.py);
        assert_relative_eq!(target_p4.pz, p4_from_mass.pz);
        let p4_from_energy = p3.with_energy(target_p4.e);
        assert_eq!(target_p4, p4_from_energy);
    }

    #[test]
    fn test_four_momentum_basics() {
        let p = Vec4::new(3.0, 4.0, 5.0, 10.0);
        assert_eq!(p.vec3(), Vec3::new(3.0, 4.0, 5.0));
        let beta = p.beta();
        assert_relative_eq!(beta.x, 0.3);
        assert_relative_eq!(beta.y, 0.4);
        assert_relative_eq!(beta.z, 0.5);
        assert_relative_eq!(p.mag(), 50.0_f64.sqrt());
        assert_relative_eq!(p.mag2(), 50.0);
        assert_relative_eq!(p.gamma(), 2.0_f64.sqrt());
        assert_relative_eq!(p.pt(), 5.0);
    }

    #[test]
    fn test_three_momentum_basics() {
        let p3 = Vec3::new(3.0, 4.0, 5.0);
        let q3 = Vec3::new(1.2, -3.4, 7.6);
        assert_relative_eq!(p3.mag(), 50.0_f64.sqrt());
        assert_relative_eq!(p3.mag2(), 50.0);
        assert_relative_eq!(p3.costheta(), 5.0 / 50.0_f64.sqrt());
        assert_relative_eq!(p3.theta(), (5.0 / 50.0_f64.sqrt()).acos());
        assert_relative_eq!(p3.phi(), 4.0_f64.atan2(3.0));
        assert_relative_eq!(p3.eta(), 1.0_f64.asinh());
        let u3 = p3.unit();
        assert_relative_eq!(u3.x, 3.0 / 50.0_f64.sqrt());
        assert_relative_eq!(u3.y, 4.0 / 50.0_f64.sqrt());
        assert_relative_eq!(u3.z, 5.0 / 50.0_f64.sqrt());
        let cross = p3.cross(&q3);
        assert_relative_eq!(cross.x, 47.4, epsilon = 1e-12);
        assert_relative_eq!(cross.y, -16.8, epsilon = 1e-12);
        assert_relative_eq!(cross.z, -15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boost_com() {
        let p = Vec4::new(3.0, 4.0, 5.0, 10.0);
        let zero = p.boost(&-p.beta()).vec3();
        assert_relative_eq!(zero.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(zero.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(zero.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boost() {
        let pa = Vec4::new(3.0, 4.0, 5.0, 10.0);
        let pb = Vec4::new(3.4, 2.3, 1.2, 9.0);
        let boosted = pa.boost(&-pb.beta());
        assert_relative_eq!(boosted.e, 8.157632144622882, epsilon = 1e-10);
        assert_relative_eq!(boosted.px, -0.6489200627053444, epsilon = 1e-10);
        assert_relative_eq!(boosted.py, 1.5316128987581492, epsilon = 1e-10);
        assert_relative_eq!(boosted.pz, 3.712145860221643, epsilon = 1e-10);
    }

    #[test]
    fn test_invariant_mass_of_pair() {
        let a = Vec3::new(0.3, 0.1, 0.2).with_mass(0.13957039);
        let b = Vec3::new(-0.2, 0.4, 0.1).with_mass(0.493677);
        let pair = a + b;
        let expected = ((a.e + b.e).powi(2) - (a.vec3() + b.vec3()).mag2()).sqrt();
        assert_relative_eq!(pair.m(), expected);
    }
}
