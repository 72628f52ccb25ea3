//! Resolución y administración de roles.
//!
//! Al arrancar, la tarea da de alta al principal con la regla del primer
//! usuario (transacción en el repositorio) y publica la sesión por `watch`.
//! Después mantiene el rol vivo: una re-lectura periódica propaga las
//! ediciones de un admin sin reiniciar la sesión. Los comandos de
//! administración quedan gateados por el chequeo central de capacidades.


use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};
use crate::context::domain::AppContext;
use crate::historial::domain::AccionHistorial;
use crate::roles::domain::{Capacidad, ComandoUsuarios, Rol, Sesion, UsuarioData};


async fn registrar(tx_historial: &mpsc::Sender<AccionHistorial>,
                   tipo: &str,
                   nombre: String) {

    let accion = AccionHistorial::Registrar {
        tipo: tipo.to_string(),
        nombre,
        estado: true,
        correo_manual: None,
        rol_manual: None,
    };
    if tx_historial.send(accion).await.is_err() {
        error!("Error: no se pudo enviar el evento al historial");
    }
}


/// Re-resuelve el rol del principal y, si es superadmin, refresca el
/// listado de usuarios administrables.
async fn refrescar(ctx: &AppContext,
                   tx_sesion: &watch::Sender<Sesion>,
                   tx_usuarios: &watch::Sender<Vec<UsuarioData>>) {

    let uid = &ctx.system.service_uid;

    let rol = match ctx.repo.obtener_usuario(uid).await {
        Ok(Some(usuario)) => usuario.rol_enum(),
        // Documento ausente: el principal queda como invitado por defecto.
        Ok(None) => Rol::Desconocido,
        Err(e) => {
            warn!("Warning: no se pudo re-leer el rol: {e}");
            return;
        }
    };

    let actual = tx_sesion.borrow().clone();
    if rol != actual.rol {
        info!("Info: rol del principal actualizado a {}", rol.como_texto());
        let _ = tx_sesion.send(Sesion { rol, ..actual });
    }

    if rol.permite(Capacidad::AdministrarUsuarios) {
        match ctx.repo.listar_usuarios(uid).await {
            Ok(lista) => {
                let _ = tx_usuarios.send(lista);
            }
            Err(e) => warn!("Warning: no se pudo listar usuarios: {e}"),
        }
    }
}


fn correo_de(usuarios: &[UsuarioData], uid: &str) -> String {
    usuarios.iter()
        .find(|u| u.uid == uid)
        .map(|u| u.correo.clone())
        .unwrap_or_else(|| uid.to_string())
}


async fn ejecutar(comando: ComandoUsuarios,
                  ctx: &AppContext,
                  tx_sesion: &watch::Sender<Sesion>,
                  tx_usuarios: &watch::Sender<Vec<UsuarioData>>,
                  tx_historial: &mpsc::Sender<AccionHistorial>) {

    let rol_actual = tx_sesion.borrow().rol;
    if !rol_actual.permite(Capacidad::AdministrarUsuarios) {
        warn!("Warning: comando de administración rechazado para rol {}", rol_actual.como_texto());
        return;
    }

    match comando {
        ComandoUsuarios::CambiarRol { uid, nuevo_rol } => {
            match ctx.repo.actualizar_rol(&uid, nuevo_rol.como_texto()).await {
                Ok(()) => {
                    let correo = correo_de(&tx_usuarios.borrow(), &uid);
                    registrar(tx_historial, "Cambio_rol",
                              format!("Usuario: {correo} → {}", nuevo_rol.como_texto())).await;
                }
                Err(e) => error!("Error: no se pudo cambiar el rol de {uid}: {e}"),
            }
        }

        ComandoUsuarios::EliminarUsuario { uid } => {
            let correo = correo_de(&tx_usuarios.borrow(), &uid);
            match ctx.repo.eliminar_usuario(&uid).await {
                Ok(()) => {
                    registrar(tx_historial, "Eliminacion", format!("Usuario: {correo}")).await;
                }
                Err(e) => error!("Error: no se pudo eliminar a {uid}: {e}"),
            }
        }
    }

    refrescar(ctx, tx_sesion, tx_usuarios).await;
}


pub async fn run_usuarios(mut rx: mpsc::Receiver<ComandoUsuarios>,
                          tx_sesion: watch::Sender<Sesion>,
                          tx_usuarios: watch::Sender<Vec<UsuarioData>>,
                          tx_historial: mpsc::Sender<AccionHistorial>,
                          app_context: AppContext) {

    info!("Info: usuarios task creada");

    let uid = app_context.system.service_uid.clone();
    let correo = app_context.system.service_correo.clone();

    let rol = match app_context.repo.bootstrap_usuario(&uid, &correo).await {
        Ok(rol) => rol,
        Err(e) => {
            error!("Error: bootstrap del principal falló: {e}");
            Rol::Desconocido
        }
    };
    info!("Info: sesión iniciada con rol {}", rol.como_texto());
    let _ = tx_sesion.send(Sesion { uid, correo, rol });

    registrar(&tx_historial, "Sesion", "Autenticación exitosa".to_string()).await;

    let mut intervalo = interval(Duration::from_secs(app_context.system.rol_refresh_secs));

    loop {
        tokio::select! {
            comando = rx.recv() => {
                let Some(comando) = comando else { break };
                ejecutar(comando, &app_context, &tx_sesion, &tx_usuarios, &tx_historial).await;
            }

            _ = intervalo.tick() => {
                refrescar(&app_context, &tx_sesion, &tx_usuarios).await;
            }
        }
    }

    info!("Info: usuarios task finalizada");
}


pub fn start_usuarios(rx_comandos: mpsc::Receiver<ComandoUsuarios>,
                      tx_sesion: watch::Sender<Sesion>,
                      tx_usuarios: watch::Sender<Vec<UsuarioData>>,
                      tx_to_historial: mpsc::Sender<AccionHistorial>,
                      ctx: AppContext) {

    info!("Info: iniciando tarea usuarios");
    tokio::spawn(async move {
        run_usuarios(rx_comandos,
                     tx_sesion,
                     tx_usuarios,
                     tx_to_historial,
                     ctx).await;
    });
}
