use sqlx::{Executor, PgPool};
use crate::roles::domain::{rol_inicial, Rol, UsuarioData};


pub async fn create_table_usuarios(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS usuarios (
            uid      TEXT PRIMARY KEY,
            correo   TEXT NOT NULL,
            nombre   TEXT NOT NULL,
            rol      TEXT NOT NULL
        );
        "#
    )
        .await?;

    Ok(())
}


pub async fn obtener(pool: &PgPool, uid: &str) -> Result<Option<UsuarioData>, sqlx::Error> {
    sqlx::query_as::<_, UsuarioData>(
        "SELECT uid, correo, nombre, rol FROM usuarios WHERE uid = $1"
    )
        .bind(uid)
        .fetch_optional(pool)
        .await
}


/// Lista todos los usuarios salvo el principal indicado.
pub async fn listar(pool: &PgPool, excluir_uid: &str) -> Result<Vec<UsuarioData>, sqlx::Error> {
    sqlx::query_as::<_, UsuarioData>(
        "SELECT uid, correo, nombre, rol FROM usuarios WHERE uid <> $1 ORDER BY correo"
    )
        .bind(excluir_uid)
        .fetch_all(pool)
        .await
}


pub async fn actualizar_rol(pool: &PgPool, uid: &str, rol: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE usuarios SET rol = $2 WHERE uid = $1")
        .bind(uid)
        .bind(rol)
        .execute(pool)
        .await?;
    Ok(())
}


pub async fn eliminar(pool: &PgPool, uid: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM usuarios WHERE uid = $1")
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(())
}


/// Alta transaccional del principal con la regla del primer usuario.
///
/// Bloquea la fila marcadora (`FOR UPDATE`): dos arranques concurrentes
/// contra un sistema vacío se serializan acá y exactamente uno observa
/// `hay_usuarios = false` y queda superadmin. Si el usuario ya existe se
/// conserva su rol y sólo se refrescan correo y nombre.
pub async fn bootstrap(pool: &PgPool, uid: &str, correo: &str) -> Result<Rol, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let hay_usuarios: bool = sqlx::query_scalar(
        "SELECT hay_usuarios FROM meta_estado WHERE unico FOR UPDATE"
    )
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(false);

    let rol_defecto = rol_inicial(hay_usuarios);
    let nombre = correo.split('@').next().unwrap_or(correo);

    sqlx::query(
        "INSERT INTO usuarios (uid, correo, nombre, rol) VALUES ($1, $2, $3, $4)
         ON CONFLICT (uid) DO UPDATE SET correo = EXCLUDED.correo, nombre = EXCLUDED.nombre"
    )
        .bind(uid)
        .bind(correo)
        .bind(nombre)
        .bind(rol_defecto.como_texto())
        .execute(&mut *tx)
        .await?;

    if !hay_usuarios {
        sqlx::query(
            "INSERT INTO meta_estado (unico, hay_usuarios) VALUES (TRUE, TRUE)
             ON CONFLICT (unico) DO UPDATE SET hay_usuarios = TRUE"
        )
            .execute(&mut *tx)
            .await?;
    }

    let rol_efectivo: String = sqlx::query_scalar("SELECT rol FROM usuarios WHERE uid = $1")
        .bind(uid)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Rol::desde_texto(&rol_efectivo))
}
