use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};

/// スカラー線形補間
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn clamp01(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// オイラー角 (x, y, z) の成分ごとの線形補間
pub fn lerp_euler(a: &[f32; 3], b: &[f32; 3], t: f32) -> [f32; 3] {
    [lerp(a[0], b[0], t), lerp(a[1], b[1], t), lerp(a[2], b[2], t)]
}

/// X→Y→Z 軸まわりの角度からクォータニオン
pub fn euler_xyz(x: f32, y: f32, z: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_angles(x, y, z)
}

/// 正規化線形補間。内積が負なら終点を反転して最短経路を取る
pub fn nlerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let qa = a.coords;
    let mut qb = b.coords;
    if qa.dot(&qb) < 0.0 {
        qb = -qb;
    }
    let mixed = qa * (1.0 - t) + qb * t;
    let len = mixed.norm();
    if len > 0.0 {
        Unit::new_unchecked(Quaternion::from(mixed / len))
    } else {
        *b
    }
}

/// 球面線形補間（t は [0,1] にクランプ）
/// slerp が不安定な配置では nlerp に落とす
pub fn slerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let t = clamp01(t);
    if t <= 0.0 {
        return *a;
    }
    if t >= 1.0 {
        return *b;
    }
    a.try_slerp(b, t, 1.0e-6).unwrap_or_else(|| nlerp(a, b, t))
}

/// from を to に重ねる最小回転。真逆のときは up 軸まわりの半回転
pub fn rotation_between(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        let axis = if from.cross(&Vector3::y()).norm() > 1.0e-6 {
            Vector3::y_axis()
        } else {
            Vector3::z_axis()
        };
        UnitQuaternion::from_axis_angle(&axis, std::f32::consts::PI)
    })
}

/// 2つの回転の角度差（ラジアン）
pub fn angle_between(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>) -> f32 {
    a.angle_to(b)
}
